//! Error types for the enforcement system

use thiserror::Error;

/// Errors that can occur during enforcement operations
#[derive(Debug, Error)]
pub enum EnforcementError {
    /// A tracked stage tried to move backwards
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    /// No enforcer with this id is configured
    #[error("Unknown enforcer: {0}")]
    UnknownEnforcer(u32),

    /// The punishment backend rejected or failed a command
    #[error("Backend command failed: {0}")]
    Backend(String),

    /// A request could not be encoded for the moderation service
    #[error("Failed to encode moderation request: {0}")]
    Encode(#[from] serde_json::Error),

    /// Message or notification delivery failed
    #[error("Notification failed: {0}")]
    Notification(String),
}

/// Result type for enforcement operations
pub type EnforcementResult<T> = Result<T, EnforcementError>;
