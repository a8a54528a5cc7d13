//! Error types for the interaction engine

use sitepilot_core_types::{LogicalElement, ResolutionAttempt};
use thiserror::Error;

/// Engine error enumeration
///
/// Everything below `FailExhausted` is recovered internally via
/// retry/escalation; only exhaustion reaches the caller, carrying the
/// full attempt trail for diagnostics.
#[derive(Debug, Error)]
pub enum EngineError {
    /// All cycles and paths exhausted without a verified success.
    /// The caller must treat this as a hard stop for the action:
    /// no verification means no assumption about page state.
    #[error("all healing cycles exhausted for {element} after {} attempts", trail.len())]
    FailExhausted {
        element: LogicalElement,
        trail: Vec<ResolutionAttempt>,
    },

    /// The caller (or the dual-path arbiter) cancelled this path
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Attempt trail if this is an exhaustion error
    pub fn trail(&self) -> Option<&[ResolutionAttempt]> {
        match self {
            EngineError::FailExhausted { trail, .. } => Some(trail),
            _ => None,
        }
    }
}
