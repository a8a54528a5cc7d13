//! Discovery backend trait and request type

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use exec_surface::LiveSnapshot;
use sitepilot_core_types::{Candidate, DiscoverySource, LogicalElement};

use crate::errors::DiscoveryError;

/// One discovery request
#[derive(Clone, Debug)]
pub struct DiscoveryRequest {
    /// Element being healed
    pub element: LogicalElement,

    /// Natural-language description of the target, from the catalogue
    pub task_hint: String,

    /// Visual + structural page state
    pub snapshot: LiveSnapshot,

    /// Fingerprints known broken in this run; never re-propose these
    pub exclusions: HashSet<String>,

    /// Total budget for this discovery, shared across backends
    pub deadline: Duration,
}

impl DiscoveryRequest {
    pub fn new(
        element: LogicalElement,
        task_hint: impl Into<String>,
        snapshot: LiveSnapshot,
        deadline: Duration,
    ) -> Self {
        Self {
            element,
            task_hint: task_hint.into(),
            snapshot,
            exclusions: HashSet::new(),
            deadline,
        }
    }

    pub fn with_exclusions(mut self, exclusions: HashSet<String>) -> Self {
        self.exclusions = exclusions;
        self
    }
}

/// A single interchangeable discovery backend.
///
/// Backends only propose; acceptance, execution and verification stay
/// with the orchestrator.
#[async_trait]
pub trait DiscoveryBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &'static str;

    /// Provenance stamped on this backend's proposals
    fn source(&self) -> DiscoverySource;

    /// Propose candidates for the request, best first
    async fn discover(&self, request: &DiscoveryRequest) -> Result<Vec<Candidate>, DiscoveryError>;
}
