//! Error types for the debug agent

use thiserror::Error;

/// Errors surfaced by capture handlers and agent operations
#[derive(Debug, Clone, Error)]
pub enum ProbeError {
    /// A known command received a payload with the wrong arity or types
    #[error("invalid payload for '{command}': {reason}")]
    InvalidPayload { command: String, reason: String },

    /// An automation command arrived but no scene host is attached
    #[error("no scene host attached")]
    SceneUnavailable,
}

impl ProbeError {
    /// Shorthand for the invalid-payload case.
    pub fn invalid(command: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPayload {
            command: command.to_string(),
            reason: reason.into(),
        }
    }
}
