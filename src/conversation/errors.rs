//! Conversation session error types.

use thiserror::Error;

/// Errors raised when a caller breaks the session contract.
///
/// These indicate a bug in the caller (for example resolving a turn that was
/// already undone) rather than a runtime condition the user caused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// The operation is not valid for the session's current state.
    #[error("invalid session state: {reason}")]
    InvalidState { reason: String },
}

impl SessionError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        SessionError::InvalidState {
            reason: reason.into(),
        }
    }
}
