//! The execution surface trait

use async_trait::async_trait;
use sitepilot_core_types::Locator;

use crate::{errors::SurfaceError, types::*};

/// Driver-agnostic capability for interacting with the live page.
///
/// Each worker owns its own surface session (its own browser
/// context); sessions are never shared across workers. All methods
/// are expected to return promptly; deadline enforcement is layered
/// on top by the caller, but implementations should fail fast with
/// [`SurfaceError::Timeout`] when their own transport stalls.
#[async_trait]
pub trait ExecutionSurface: Send + Sync {
    /// Resolve a locator into a live handle
    async fn locate(&self, locator: &Locator) -> Result<ElementHandle, SurfaceError>;

    /// Perform an action against a handle
    async fn act(&self, handle: &ElementHandle, action: &Action) -> Result<(), SurfaceError>;

    /// Capture visual + structural page state for a context
    async fn snapshot(&self, page_context: &str) -> Result<LiveSnapshot, SurfaceError>;

    /// Extract the current value of a handle
    async fn read(&self, handle: &ElementHandle) -> Result<String, SurfaceError>;
}
