//! Inference — everything that talks to the Ollama server.
//!
//! This module handles:
//! - Configuration (defaults, `chat-relay.yaml`, environment overrides)
//! - The HTTP client for `/api/tags` and `/api/chat`
//! - Model listing normalization (`ModelList`)
//! - Relaying a session's pending turn and rendering failures as text

pub mod client;
pub mod config;
pub mod errors;
pub mod registry;
pub mod relay;
pub mod types;

// Re-exports for convenience
pub use client::OllamaClient;
pub use config::{LogFormat, RelayConfig};
pub use errors::RelayError;
pub use registry::{ModelList, ModelRegistry, NO_MODELS_AVAILABLE};
pub use relay::RelayInvoker;
pub use types::{ChatMessage, Role};
