//! AI discovery adapter - proposes candidate locators, never executes
//!
//! A [`DiscoveryHub`] owns an ordered list of interchangeable
//! backends (cheap/local first, capable/remote later) and tries them
//! in sequence under a single deadline budget. Proposals are filtered
//! against the caller's exclusion set (heatmap-hot fingerprints) and
//! a usability floor before anyone gets to trust them.

pub mod backend;
pub mod errors;
pub mod heuristic;
pub mod hub;
pub mod scripted;

pub use backend::*;
pub use errors::*;
pub use heuristic::*;
pub use hub::*;
pub use scripted::*;
