//! Interaction orchestrator - the self-healing resolution engine
//!
//! Drives a logical action through the confidence-gated state machine:
//! resolve the best cached candidate, validate it locally, escalate to
//! AI discovery when the cache cannot be trusted, execute, verify the
//! caller's post-condition, and feed every attempt back into the
//! knowledge store and failure heatmap. Critical actions run the
//! primary/backup dual-path protocol.
//!
//! The attempt budget (R local retries x M full cycles, every blocking
//! call under a deadline) makes worst-case wall-clock time a computable
//! bound; no path through the machine retries forever.

pub mod config;
pub mod engine;
pub mod errors;
pub mod machine;
pub mod pool;
pub mod reinforce;
pub mod request;
pub mod verify;

pub use config::*;
pub use engine::*;
pub use errors::*;
pub use machine::*;
pub use pool::*;
pub use reinforce::*;
pub use request::*;
pub use verify::*;
