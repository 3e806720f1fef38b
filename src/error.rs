//! Error types for the dispatch engine.

use thiserror::Error;

/// Result type alias using the rollcall error type.
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Main error type for the dispatch engine.
///
/// Only [`DispatchError::Validation`], [`DispatchError::TransportUnavailable`] and the
/// catch-all variants ever escape a dispatch. Per-recipient errors are folded into the
/// report as failed outcomes.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// The dispatch request is malformed (missing recipients, subject or body)
    #[error("Validation error: {0}")]
    Validation(String),

    /// The transport could not be constructed or authenticated
    #[error("Transport unavailable: {0}")]
    TransportUnavailable(String),

    /// Delivery to a single recipient failed
    #[error("Failed to send to {address}: {reason}")]
    Send { address: String, reason: String },

    /// A send did not finish within its time budget
    #[error("Send timed out after {0} ms")]
    Timeout(u64),

    /// Invalid engine or transport configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// The dispatch deadline ran out before the send finished
    #[error("dispatch deadline exceeded")]
    DeadlineExceeded,

    /// General error from anyhow
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DispatchError {
    /// Human-readable reason recorded against a failed recipient.
    ///
    /// Strips the address prefix from [`DispatchError::Send`] since the outcome already
    /// carries the recipient.
    pub fn failure_reason(&self) -> String {
        match self {
            DispatchError::Send { reason, .. } => reason.clone(),
            other => other.to_string(),
        }
    }
}
