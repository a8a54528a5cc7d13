//! Error types for the execution surface

use thiserror::Error;

/// Surface error enumeration
#[derive(Debug, Error, Clone)]
pub enum SurfaceError {
    /// Locator did not resolve to a live element
    #[error("Element not found: {0}")]
    NotFound(String),

    /// Action primitive errored against a resolved handle
    #[error("Action failed: {0}")]
    ActionFailed(String),

    /// Value extraction failed on a resolved handle
    #[error("Extract failed: {0}")]
    ExtractFailed(String),

    /// A deadline elapsed inside the surface
    #[error("Surface timeout: {0}")]
    Timeout(String),

    /// The browser session/context is gone
    #[error("Session closed: {0}")]
    SessionClosed(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}
