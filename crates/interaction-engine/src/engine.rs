//! Public engine facade and the dual-path redundancy protocol

use std::sync::Arc;

use candidate_gate::CandidateGate;
use discovery_hub::DiscoveryHub;
use exec_surface::ExecutionSurface;
use failure_heatmap::SharedFailureHeatmap;
use selector_memory::{SharedKnowledgeStore, StoreStatsSnapshot};
use sitepilot_core_types::{AttemptPath, Criticality};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::EngineConfig;
use crate::errors::EngineError;
use crate::machine::PathRunner;
use crate::reinforce::ReinforcementManager;
use crate::request::{PerformOutcome, PerformRequest};

/// Self-healing interaction engine.
///
/// Cheap to clone; all state is shared. One engine per worker, with
/// the worker's own surface session, over process-wide knowledge
/// store and heatmap.
#[derive(Clone)]
pub struct InteractionEngine {
    runner: Arc<PathRunner>,
    store: SharedKnowledgeStore,
    heatmap: SharedFailureHeatmap,
    config: EngineConfig,
}

impl InteractionEngine {
    pub fn new(
        surface: Arc<dyn ExecutionSurface>,
        store: SharedKnowledgeStore,
        heatmap: SharedFailureHeatmap,
        gate: Arc<dyn CandidateGate>,
        discovery: Arc<DiscoveryHub>,
        config: EngineConfig,
    ) -> Self {
        let reinforce = ReinforcementManager::new(store.clone(), heatmap.clone());
        let runner = Arc::new(PathRunner::new(
            surface,
            store.clone(),
            heatmap.clone(),
            gate,
            discovery,
            reinforce,
            config,
        ));
        Self {
            runner,
            store,
            heatmap,
            config,
        }
    }

    pub fn config(&self) -> EngineConfig {
        self.config
    }

    pub fn knowledge_stats(&self) -> StoreStatsSnapshot {
        self.store.stats_snapshot()
    }

    /// Perform one logical action, healing as needed.
    ///
    /// Normal requests run the single-path machine. Critical read-only
    /// requests run the dual-path protocol: a backup path with forced
    /// discovery races the primary, the first verified result wins and
    /// the loser is cancelled. The backup ignores the cache entirely,
    /// so a poisoned cache cannot take both paths down. Critical
    /// mutating actions stay single-path: two paths mean two
    /// executions, and a click or keystroke must not land twice.
    pub async fn perform(&self, req: PerformRequest) -> Result<PerformOutcome, EngineError> {
        if req.criticality == Criticality::Critical {
            if req.action.is_readonly() {
                return self.dual_path(req).await;
            }
            warn!(
                element = %req.element,
                action = req.action.name(),
                "critical mutating action runs single-path"
            );
        }
        self.runner
            .run(
                &req,
                AttemptPath::Primary,
                false,
                false,
                &CancellationToken::new(),
            )
            .await
    }

    async fn dual_path(&self, req: PerformRequest) -> Result<PerformOutcome, EngineError> {
        let cancel = CancellationToken::new();

        // The primary yields after a verify failure instead of
        // resolving again, so a completed backup is adopted rather
        // than the primary re-reading a page it already mistrusts.
        let primary_runner = self.runner.clone();
        let primary_req = req.clone();
        let primary_cancel = cancel.child_token();
        let mut primary = tokio::spawn(async move {
            primary_runner
                .run(&primary_req, AttemptPath::Primary, false, true, &primary_cancel)
                .await
        });

        let backup_runner = self.runner.clone();
        let backup_req = req.clone();
        let backup_cancel = cancel.child_token();
        let mut backup = tokio::spawn(async move {
            backup_runner
                .run(&backup_req, AttemptPath::Backup, true, false, &backup_cancel)
                .await
        });

        enum First {
            Primary(Result<PerformOutcome, EngineError>),
            Backup(Result<PerformOutcome, EngineError>),
        }

        // First verified result wins; a path that exhausts first
        // leaves the survivor to decide the outcome.
        let first = tokio::select! {
            res = &mut primary => First::Primary(flatten(res)),
            res = &mut backup => First::Backup(flatten(res)),
        };

        match first {
            First::Primary(Ok(outcome)) => {
                cancel.cancel();
                backup.abort();
                Ok(outcome)
            }
            First::Backup(Ok(outcome)) => {
                cancel.cancel();
                primary.abort();
                info!(element = %req.element, "backup path adopted");
                Ok(outcome)
            }
            First::Primary(Err(primary_err)) => {
                warn!(
                    element = %req.element,
                    error = %primary_err,
                    "primary path out, awaiting backup"
                );
                match flatten(backup.await) {
                    Ok(outcome) => {
                        info!(element = %req.element, "backup path adopted");
                        Ok(outcome)
                    }
                    Err(backup_err) => Err(merge_failures(primary_err, backup_err)),
                }
            }
            First::Backup(Err(backup_err)) => match flatten(primary.await) {
                Ok(outcome) => Ok(outcome),
                Err(primary_err) => Err(merge_failures(primary_err, backup_err)),
            },
        }
    }

    /// Flush learned state to disk, for shutdown paths
    pub fn flush(&self) -> std::io::Result<()> {
        self.store.persist_now()?;
        self.heatmap.persist_now()
    }
}

fn flatten(
    res: Result<Result<PerformOutcome, EngineError>, tokio::task::JoinError>,
) -> Result<PerformOutcome, EngineError> {
    match res {
        Ok(inner) => inner,
        Err(join_err) => Err(EngineError::Internal(format!("path task failed: {join_err}"))),
    }
}

/// Fold both paths' exhaustion trails into one error for diagnostics
fn merge_failures(primary: EngineError, backup: EngineError) -> EngineError {
    match (primary, backup) {
        (
            EngineError::FailExhausted { element, mut trail },
            EngineError::FailExhausted {
                trail: backup_trail,
                ..
            },
        ) => {
            trail.extend(backup_trail);
            EngineError::FailExhausted { element, trail }
        }
        (primary, _) => primary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candidate_gate::LocalProbeGate;
    use discovery_hub::ScriptedBackend;
    use exec_surface::{Action, ScriptedElement, ScriptedSurface};
    use failure_heatmap::{FailureHeatmap, HeatmapPolicy};
    use selector_memory::{KnowledgeStore, StorePolicy};
    use sitepilot_core_types::{Candidate, DiscoverySource, Locator, LogicalElement};
    use std::time::Duration;

    struct Harness {
        surface: Arc<ScriptedSurface>,
        store: SharedKnowledgeStore,
        backend: Arc<ScriptedBackend>,
        engine: InteractionEngine,
    }

    fn harness() -> Harness {
        harness_with_backend_delay(Duration::ZERO)
    }

    fn harness_with_backend_delay(delay: Duration) -> Harness {
        let surface = Arc::new(ScriptedSurface::new());
        let store = Arc::new(KnowledgeStore::new(StorePolicy::default()));
        let heatmap = Arc::new(FailureHeatmap::new(HeatmapPolicy::default()));
        let backend = Arc::new(
            ScriptedBackend::new("scripted", DiscoverySource::AiCloud).with_delay(delay),
        );
        let discovery = Arc::new(DiscoveryHub::new(vec![backend.clone()]));
        let gate = Arc::new(LocalProbeGate::new(surface.clone()));
        let config = EngineConfig {
            local_retry_backoff: Duration::from_millis(5),
            discovery_deadline: Duration::from_millis(500),
            ..EngineConfig::default()
        };
        let engine = InteractionEngine::new(
            surface.clone(),
            store.clone(),
            heatmap,
            gate,
            discovery,
            config,
        );
        Harness {
            surface,
            store,
            backend,
            engine,
        }
    }

    fn element() -> LogicalElement {
        LogicalElement::new("betslip", "confirm_button")
    }

    fn cached(selector: &str, confidence: f64) -> Candidate {
        Candidate::new(
            Locator::selector(selector),
            confidence,
            DiscoverySource::Cached,
        )
    }

    #[tokio::test]
    async fn test_normal_request_single_path() {
        let h = harness();
        h.surface
            .add_element(ScriptedElement::new(Locator::selector("#confirm"), "OK"));
        h.store.upsert(&element(), cached("#confirm", 0.9));

        let outcome = h
            .engine
            .perform(PerformRequest::new(element(), Action::Click))
            .await
            .unwrap();
        assert_eq!(outcome.path, AttemptPath::Primary);
        assert_eq!(h.backend.calls(), 0);
    }

    fn balance() -> LogicalElement {
        LogicalElement::new("main", "balance_display")
    }

    #[tokio::test]
    async fn test_critical_healthy_cache_primary_wins() {
        // Backup has to wait on discovery, so the cached primary wins
        let h = harness_with_backend_delay(Duration::from_millis(50));
        h.surface.add_element(ScriptedElement::new(
            Locator::selector("#balance"),
            "142.50",
        ));
        h.store.upsert(&balance(), cached("#balance", 0.9));
        // Give the backup something so it does not just burn declines
        h.backend.push_proposals(vec![Candidate::new(
            Locator::selector("#balance"),
            0.8,
            DiscoverySource::AiCloud,
        )]);

        let outcome = h
            .engine
            .perform(PerformRequest::new(balance(), Action::Extract).critical())
            .await
            .unwrap();
        assert_eq!(outcome.path, AttemptPath::Primary);
        assert_eq!(outcome.value.as_deref(), Some("142.50"));
    }

    #[tokio::test]
    async fn test_critical_poisoned_cache_backup_adopted() {
        let h = harness();
        // Cached selector points at an element stuck invisible, so the
        // primary spends its cycles on local retries and declines.
        // The working element is only reachable through discovery, and
        // the single queued proposal goes to whichever path asks first
        // (the backup, since it skips straight to escalation).
        let stale = Locator::selector("#balance-old");
        h.surface
            .add_element(ScriptedElement::new(stale.clone(), "142.50"));
        h.surface.set_visible(&stale, false);
        h.store.upsert(&balance(), cached("#balance-old", 0.9));

        h.surface.add_element(ScriptedElement::new(
            Locator::selector("#balance-v2"),
            "142.50",
        ));
        h.backend.push_proposals(vec![Candidate::new(
            Locator::selector("#balance-v2"),
            0.8,
            DiscoverySource::AiCloud,
        )]);

        let outcome = h
            .engine
            .perform(PerformRequest::new(balance(), Action::Extract).critical())
            .await
            .unwrap();

        assert_eq!(outcome.path, AttemptPath::Backup);
        assert_eq!(outcome.value.as_deref(), Some("142.50"));
        let reads: Vec<_> = h
            .surface
            .performed()
            .into_iter()
            .filter(|(fp, _)| fp == "css:#balance-v2")
            .collect();
        assert_eq!(reads.len(), 1);
    }

    #[tokio::test]
    async fn test_critical_primary_verify_failure_adopts_backup() {
        // The cached element reads fine but the first verification
        // sees a stale page; only the later verification passes. The
        // primary must stop at its verify failure and the backup's
        // value must come back, with no second read from the primary.
        let h = harness_with_backend_delay(Duration::from_millis(50));
        h.surface.add_element(ScriptedElement::new(
            Locator::selector("#balance-old"),
            "STALE",
        ));
        h.store.upsert(&balance(), cached("#balance-old", 0.9));

        h.surface.add_element(ScriptedElement::new(
            Locator::selector("#balance-v2"),
            "142.50",
        ));
        h.backend.push_proposals(vec![Candidate::new(
            Locator::selector("#balance-v2"),
            0.8,
            DiscoverySource::AiCloud,
        )]);

        struct StaleOnce(std::sync::atomic::AtomicUsize);
        #[async_trait::async_trait]
        impl crate::verify::VerifyProbe for StaleOnce {
            async fn verify(&self, _surface: &dyn ExecutionSurface) -> bool {
                self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst) > 0
            }
        }

        let req = PerformRequest::new(balance(), Action::Extract)
            .with_verify(Arc::new(StaleOnce(Default::default())))
            .critical();
        let outcome = h.engine.perform(req).await.unwrap();

        assert_eq!(outcome.path, AttemptPath::Backup);
        assert_eq!(outcome.value.as_deref(), Some("142.50"));
        // Primary executed exactly once before yielding
        let stale_reads: Vec<_> = h
            .surface
            .performed()
            .into_iter()
            .filter(|(fp, _)| fp == "css:#balance-old")
            .collect();
        assert_eq!(stale_reads.len(), 1);
    }

    #[tokio::test]
    async fn test_critical_mutating_action_stays_single_path() {
        let h = harness();
        h.surface
            .add_element(ScriptedElement::new(Locator::selector("#confirm"), "OK"));
        h.store.upsert(&element(), cached("#confirm", 0.9));

        let outcome = h
            .engine
            .perform(PerformRequest::new(element(), Action::Click).critical())
            .await
            .unwrap();

        assert_eq!(outcome.path, AttemptPath::Primary);
        // No backup path, so no forced discovery and a single click
        assert_eq!(h.backend.calls(), 0);
        assert_eq!(h.surface.performed().len(), 1);
    }

    #[tokio::test]
    async fn test_critical_both_paths_fail() {
        let h = harness();
        // Empty page, empty cache, discovery declines everything
        let err = h
            .engine
            .perform(PerformRequest::new(balance(), Action::Extract).critical())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::FailExhausted { .. }));
    }

    #[tokio::test]
    async fn test_flush_writes_nothing_without_persistence() {
        let h = harness();
        h.engine.flush().unwrap();
    }
}
