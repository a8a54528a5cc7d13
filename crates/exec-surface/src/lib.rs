//! Execution surface capability - the only doorway to the live page
//!
//! The engine never talks to a browser driver directly. It consumes
//! four primitives behind the [`ExecutionSurface`] trait:
//! - locate: resolve a concrete locator into a live handle
//! - act: click/type against a handle
//! - snapshot: capture visual + structural page state
//! - read: extract a value from a handle
//!
//! A scripted in-memory implementation backs tests and the demo; a
//! real CDP/WebDriver adapter plugs in through the same trait.

pub mod errors;
pub mod scripted;
pub mod surface;
pub mod types;

pub use errors::*;
pub use scripted::*;
pub use surface::*;
pub use types::*;
