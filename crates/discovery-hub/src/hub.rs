//! Backend rotation under a single deadline budget

use std::sync::Arc;
use std::time::Instant;

use sitepilot_core_types::Candidate;
use tracing::{debug, info, warn};

use crate::{backend::*, errors::DiscoveryError};

/// Default usability floor for proposals
pub const DEFAULT_USABILITY_FLOOR: f64 = 0.35;

/// Ordered backend chain with shared deadline and usability floor
pub struct DiscoveryHub {
    backends: Vec<Arc<dyn DiscoveryBackend>>,
    usability_floor: f64,
}

impl DiscoveryHub {
    pub fn new(backends: Vec<Arc<dyn DiscoveryBackend>>) -> Self {
        Self {
            backends,
            usability_floor: DEFAULT_USABILITY_FLOOR,
        }
    }

    pub fn with_usability_floor(mut self, floor: f64) -> Self {
        self.usability_floor = floor;
        self
    }

    /// Run the backend chain. The first backend to return usable
    /// proposals wins. The deadline is one shared budget: each backend
    /// gets an even slice of whatever is left, so a stalled early
    /// backend cannot starve the fallbacks.
    pub async fn discover(
        &self,
        request: &DiscoveryRequest,
    ) -> Result<Vec<Candidate>, DiscoveryError> {
        if self.backends.is_empty() {
            return Err(DiscoveryError::Internal(
                "no discovery backends configured".to_string(),
            ));
        }

        let started = Instant::now();
        let total = self.backends.len() as u32;
        let mut saw_proposals = false;

        for (index, backend) in self.backends.iter().enumerate() {
            let remaining = request.deadline.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                break;
            }
            let slice = remaining / (total - index as u32);

            debug!(
                backend = backend.name(),
                element = %request.element,
                slice_ms = slice.as_millis() as u64,
                "trying discovery backend"
            );

            let outcome = tokio::time::timeout(slice, backend.discover(request)).await;
            match outcome {
                Err(_) => {
                    warn!(backend = backend.name(), "discovery backend timed out");
                    continue;
                }
                Ok(Err(err)) if err.is_fallthrough() => {
                    debug!(backend = backend.name(), error = %err, "backend declined, falling through");
                    continue;
                }
                Ok(Err(err)) => return Err(err),
                Ok(Ok(proposals)) => {
                    if !proposals.is_empty() {
                        saw_proposals = true;
                    }
                    let usable = self.screen(request, proposals);
                    if !usable.is_empty() {
                        info!(
                            backend = backend.name(),
                            element = %request.element,
                            proposals = usable.len(),
                            top_confidence = usable[0].confidence,
                            "discovery produced candidates"
                        );
                        return Ok(usable);
                    }
                }
            }
        }

        if saw_proposals {
            Err(DiscoveryError::Ambiguous(format!(
                "no proposal for {} met the {:.2} usability floor",
                request.element, self.usability_floor
            )))
        } else {
            Err(DiscoveryError::Unavailable(format!(
                "no backend proposed candidates for {} within {:?}",
                request.element, request.deadline
            )))
        }
    }

    /// Drop excluded fingerprints and sub-floor proposals, best first
    fn screen(&self, request: &DiscoveryRequest, proposals: Vec<Candidate>) -> Vec<Candidate> {
        let mut usable: Vec<Candidate> = proposals
            .into_iter()
            .filter(|c| !request.exclusions.contains(&c.fingerprint()))
            .filter(|c| c.confidence >= self.usability_floor)
            .collect();
        usable.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        usable
    }
}
