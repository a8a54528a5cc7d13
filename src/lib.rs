//! SitePilot library
//!
//! Exposes the CLI application's modules for integration testing.

pub mod catalogue;
pub mod config;
pub mod runtime;

pub use config::AppConfig;
pub use runtime::{Runtime, RuntimeError};
