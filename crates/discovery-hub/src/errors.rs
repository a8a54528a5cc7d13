//! Error types for the discovery adapter

use thiserror::Error;

/// Discovery error enumeration
#[derive(Debug, Error, Clone)]
pub enum DiscoveryError {
    /// No backend produced proposals within the deadline
    #[error("Discovery unavailable: {0}")]
    Unavailable(String),

    /// Proposals came back, but none met the usability floor
    #[error("Discovery ambiguous: {0}")]
    Ambiguous(String),

    /// A single backend declined this request (hub keeps going)
    #[error("Backend '{backend}' declined: {reason}")]
    BackendDeclined { backend: String, reason: String },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DiscoveryError {
    /// Whether the hub should try the next backend after this error
    pub fn is_fallthrough(&self) -> bool {
        matches!(
            self,
            DiscoveryError::BackendDeclined { .. } | DiscoveryError::Unavailable(_)
        )
    }
}
