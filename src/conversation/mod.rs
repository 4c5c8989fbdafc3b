//! Conversation — per-connection turn history.
//!
//! Submodules:
//! - `session`: turns, the single-pending-turn rule, undo / retry / clear
//! - `errors`: session contract violations

pub mod errors;
pub mod session;

pub use errors::SessionError;
pub use session::{RetryRequest, Session, Turn, TurnHandle, TurnState};
