//! Deterministic backend used for tests and offline development

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sitepilot_core_types::{Candidate, DiscoverySource};

use crate::{backend::*, errors::DiscoveryError};

/// Scripted backend: replays queued responses in order.
/// With an empty queue it declines, which exercises hub fallthrough.
pub struct ScriptedBackend {
    name: &'static str,
    source: DiscoverySource,
    responses: Mutex<VecDeque<Result<Vec<Candidate>, DiscoveryError>>>,
    requests: Mutex<Vec<DiscoveryRequest>>,
    calls: AtomicU64,
    delay: Duration,
}

impl ScriptedBackend {
    pub fn new(name: &'static str, source: DiscoverySource) -> Self {
        Self {
            name,
            source,
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            calls: AtomicU64::new(0),
            delay: Duration::ZERO,
        }
    }

    /// Fixed latency before every response, for deadline tests
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Queue a successful response
    pub fn push_proposals(&self, proposals: Vec<Candidate>) {
        self.responses.lock().push_back(Ok(proposals));
    }

    /// Queue a decline
    pub fn push_decline(&self, reason: &str) {
        self.responses
            .lock()
            .push_back(Err(DiscoveryError::BackendDeclined {
                backend: self.name.to_string(),
                reason: reason.to_string(),
            }));
    }

    /// Number of discover() calls received so far
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Requests received so far (exclusion assertions live on these)
    pub fn requests(&self) -> Vec<DiscoveryRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl DiscoveryBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        self.name
    }

    fn source(&self) -> DiscoverySource {
        self.source
    }

    async fn discover(&self, request: &DiscoveryRequest) -> Result<Vec<Candidate>, DiscoveryError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        self.requests.lock().push(request.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.responses
            .lock()
            .pop_front()
            .unwrap_or_else(|| {
                Err(DiscoveryError::BackendDeclined {
                    backend: self.name.to_string(),
                    reason: "script exhausted".to_string(),
                })
            })
    }
}
