//! Reinforcement manager - the only writer of learned state
//!
//! Single entry point invoked after every execute/verify step. Applies
//! the store's confidence update, records heatmap failures, and admits
//! freshly-discovered candidates into the store once they have proven
//! themselves. Write serialization per logical element comes from the
//! store's own per-key locking; callers never touch confidence
//! directly.

use failure_heatmap::SharedFailureHeatmap;
use selector_memory::SharedKnowledgeStore;
use sitepilot_core_types::{DiscoverySource, ResolutionAttempt};
use tracing::{debug, info};

/// Updates knowledge store and heatmap from attempt outcomes
#[derive(Clone)]
pub struct ReinforcementManager {
    store: SharedKnowledgeStore,
    heatmap: SharedFailureHeatmap,
}

impl ReinforcementManager {
    pub fn new(store: SharedKnowledgeStore, heatmap: SharedFailureHeatmap) -> Self {
        Self { store, heatmap }
    }

    /// Fold one attempt into the learned state.
    ///
    /// Success: the candidate is admitted to the store if new (this is
    /// how AI discoveries get promoted - once their reinforced
    /// confidence passes the incumbent's, ranked retrieval surfaces
    /// them first) and its confidence is boosted.
    ///
    /// Failure: heatmap entry for the pattern, confidence decay if the
    /// candidate is known. A rejected AI proposal is never admitted.
    pub fn on_attempt(&self, attempt: &ResolutionAttempt) {
        let element = &attempt.element;
        let candidate = &attempt.candidate;
        let fingerprint = candidate.fingerprint();

        if attempt.outcome.is_success() {
            let known = self.store.find_by_fingerprint(element, &fingerprint);
            let id = match known {
                Some(existing) => existing.id,
                None => {
                    if candidate.discovered_via != DiscoverySource::Cached {
                        info!(
                            element = %element,
                            candidate = %candidate.locator,
                            via = candidate.discovered_via.name(),
                            "admitting discovered candidate to knowledge store"
                        );
                    }
                    self.store.upsert(element, candidate.clone());
                    candidate.id.clone()
                }
            };
            self.store.record_outcome(element, &id, true);
        } else {
            self.heatmap
                .record_failure(&element.page_context, candidate);
            if let Some(known) = self.store.find_by_fingerprint(element, &fingerprint) {
                self.store.record_outcome(element, &known.id, false);
            }
        }

        debug!(attempt = %attempt, "attempt reinforced");
    }
}
