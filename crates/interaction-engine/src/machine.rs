//! Single-path resolution state machine
//!
//! Drives one request along one redundancy path, up to `max_cycles`
//! resolve-execute-verify cycles. Within a cycle the steps are
//! explicit: resolve the best cached candidate, validate it locally
//! (with bounded retries for transient misses), escalate to the
//! discovery hub when the cache cannot be trusted, execute, verify.
//! Every step runs under its own deadline and every attempt is fed to
//! the reinforcement manager before the next transition, so learned
//! state is current even when the path is abandoned mid-flight.

use std::sync::Arc;
use std::time::Instant;

use candidate_gate::{CandidateGate, ValidationBand};
use discovery_hub::{DiscoveryHub, DiscoveryRequest};
use exec_surface::{Action, ExecutionSurface, LiveSnapshot, SurfaceError};
use failure_heatmap::SharedFailureHeatmap;
use selector_memory::SharedKnowledgeStore;
use sitepilot_core_types::{
    AttemptOutcome, AttemptPath, AttemptTier, Candidate, ResolutionAttempt,
};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::errors::EngineError;
use crate::reinforce::ReinforcementManager;
use crate::request::{PerformOutcome, PerformRequest};

/// Transition within one healing cycle
enum CycleStep {
    /// Consult the knowledge store for a trustworthy cached candidate
    Resolve,

    /// Ask the discovery hub for fresh candidates
    Escalate,

    /// A candidate passed validation; run the action against it
    Execute {
        candidate: Candidate,
        tier: AttemptTier,
    },

    /// Nothing usable this cycle; burn the cycle and start the next
    GiveUp,
}

/// How a cycle ended
enum CycleEnd {
    /// Executed and verified; carries the extracted value if any
    Verified(Option<String>),

    /// Cycle spent without a verified success
    Failed,
}

/// Runs the cycle state machine for one path of one request
pub struct PathRunner {
    surface: Arc<dyn ExecutionSurface>,
    store: SharedKnowledgeStore,
    heatmap: SharedFailureHeatmap,
    gate: Arc<dyn CandidateGate>,
    discovery: Arc<DiscoveryHub>,
    reinforce: ReinforcementManager,
    config: EngineConfig,
}

impl PathRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        surface: Arc<dyn ExecutionSurface>,
        store: SharedKnowledgeStore,
        heatmap: SharedFailureHeatmap,
        gate: Arc<dyn CandidateGate>,
        discovery: Arc<DiscoveryHub>,
        reinforce: ReinforcementManager,
        config: EngineConfig,
    ) -> Self {
        Self {
            surface,
            store,
            heatmap,
            gate,
            discovery,
            reinforce,
            config,
        }
    }

    /// Run up to `max_cycles` cycles. `force_discovery` makes every
    /// cycle start at escalation, which is how the backup path stays
    /// independent of the (possibly poisoned) cache.
    /// `yield_on_verify_failure` ends the path after its first verify
    /// failure instead of starting another cycle; the dual-path
    /// primary runs this way so a racing backup gets adopted rather
    /// than the action firing again from a fresh resolve.
    pub async fn run(
        &self,
        req: &PerformRequest,
        path: AttemptPath,
        force_discovery: bool,
        yield_on_verify_failure: bool,
        cancel: &CancellationToken,
    ) -> Result<PerformOutcome, EngineError> {
        let started = Instant::now();
        let mut trail: Vec<ResolutionAttempt> = Vec::new();

        for cycle in 0..self.config.max_cycles {
            self.check_cancelled(path, cancel)?;

            let snapshot = match timeout(
                self.config.snapshot_timeout,
                self.surface.snapshot(&req.element.page_context),
            )
            .await
            {
                Ok(Ok(snapshot)) => snapshot,
                Ok(Err(err)) => {
                    warn!(element = %req.element, cycle, error = %err, "snapshot failed");
                    continue;
                }
                Err(_) => {
                    warn!(element = %req.element, cycle, "snapshot timed out");
                    continue;
                }
            };

            let end = self
                .run_cycle(req, path, force_discovery, &snapshot, &mut trail, cancel)
                .await?;
            match end {
                CycleEnd::Verified(value) => {
                    let outcome = PerformOutcome {
                        value,
                        attempts: trail.len() as u32,
                        path,
                        elapsed: started.elapsed(),
                    };
                    info!(
                        element = %req.element,
                        path = path.name(),
                        attempts = outcome.attempts,
                        elapsed_ms = outcome.elapsed.as_millis() as u64,
                        "action verified"
                    );
                    return Ok(outcome);
                }
                CycleEnd::Failed => {
                    let verify_failed = trail
                        .last()
                        .map_or(false, |a| a.outcome == AttemptOutcome::VerifyFailed);
                    if yield_on_verify_failure && verify_failed {
                        debug!(
                            element = %req.element,
                            path = path.name(),
                            cycle,
                            "verify failed, yielding to the sibling path"
                        );
                        break;
                    }
                    debug!(element = %req.element, path = path.name(), cycle, "cycle failed");
                }
            }
        }

        Err(EngineError::FailExhausted {
            element: req.element.clone(),
            trail,
        })
    }

    async fn run_cycle(
        &self,
        req: &PerformRequest,
        path: AttemptPath,
        force_discovery: bool,
        snapshot: &LiveSnapshot,
        trail: &mut Vec<ResolutionAttempt>,
        cancel: &CancellationToken,
    ) -> Result<CycleEnd, EngineError> {
        let mut step = if force_discovery {
            CycleStep::Escalate
        } else {
            CycleStep::Resolve
        };

        loop {
            self.check_cancelled(path, cancel)?;
            step = match step {
                CycleStep::Resolve => self.resolve_cached(req, path, snapshot, trail).await,
                CycleStep::Escalate => self.escalate(req, path, snapshot, trail).await,
                CycleStep::Execute { candidate, tier } => {
                    return Ok(self
                        .execute_and_verify(req, path, tier, candidate, trail)
                        .await);
                }
                CycleStep::GiveUp => return Ok(CycleEnd::Failed),
            };
        }
    }

    /// Phase-0: trust check plus local validation with bounded retries.
    /// Never calls a discovery backend; a trusted candidate that
    /// validates here costs nothing but a locate probe.
    async fn resolve_cached(
        &self,
        req: &PerformRequest,
        path: AttemptPath,
        snapshot: &LiveSnapshot,
        trail: &mut Vec<ResolutionAttempt>,
    ) -> CycleStep {
        let Some(top) = self.store.top_candidate(&req.element) else {
            debug!(element = %req.element, "no cached candidate");
            return CycleStep::Escalate;
        };

        if top.confidence < self.config.gate.cached_trust {
            debug!(
                element = %req.element,
                confidence = top.confidence,
                "cached confidence below trust threshold"
            );
            return CycleStep::Escalate;
        }

        if self.heatmap.is_hot(&req.element.page_context, &top) {
            debug!(element = %req.element, candidate = %top.locator, "cached candidate is hot");
            return CycleStep::Escalate;
        }

        for retry in 0..=self.config.local_retries {
            let tier = if retry == 0 {
                AttemptTier::Cached
            } else {
                AttemptTier::LocalRetry
            };
            let probe_started = Instant::now();

            let score = match timeout(
                self.config.validate_timeout,
                self.gate.validate(&top, snapshot),
            )
            .await
            {
                Ok(score) => score,
                Err(_) => {
                    self.record(
                        trail,
                        req,
                        &top,
                        path,
                        tier,
                        AttemptOutcome::Timeout,
                        probe_started.elapsed(),
                    );
                    return CycleStep::Escalate;
                }
            };

            match self.config.gate.band(score) {
                ValidationBand::Pass => {
                    return CycleStep::Execute {
                        candidate: top,
                        tier,
                    };
                }
                ValidationBand::LowConfidence if retry < self.config.local_retries => {
                    debug!(
                        element = %req.element,
                        score,
                        retry,
                        "low-confidence validation, retrying locally"
                    );
                    tokio::time::sleep(self.config.local_retry_backoff).await;
                }
                ValidationBand::LowConfidence | ValidationBand::Absent => {
                    self.record(
                        trail,
                        req,
                        &top,
                        path,
                        tier,
                        AttemptOutcome::Rejected,
                        probe_started.elapsed(),
                    );
                    return CycleStep::Escalate;
                }
            }
        }

        CycleStep::Escalate
    }

    /// Ask the hub for candidates, excluding currently-hot patterns,
    /// and accept the first proposal that clears the gate.
    async fn escalate(
        &self,
        req: &PerformRequest,
        path: AttemptPath,
        snapshot: &LiveSnapshot,
        trail: &mut Vec<ResolutionAttempt>,
    ) -> CycleStep {
        let exclusions = self.heatmap.excluded_fingerprints(&req.element.page_context);
        let request = DiscoveryRequest::new(
            req.element.clone(),
            req.task_hint.clone(),
            snapshot.clone(),
            self.config.discovery_deadline,
        )
        .with_exclusions(exclusions);

        let proposals = match self.discovery.discover(&request).await {
            Ok(proposals) => proposals,
            Err(err) => {
                warn!(element = %req.element, error = %err, "discovery failed");
                return CycleStep::GiveUp;
            }
        };

        for proposal in proposals {
            let probe_started = Instant::now();
            let score = match timeout(
                self.config.validate_timeout,
                self.gate.validate(&proposal, snapshot),
            )
            .await
            {
                Ok(score) => score,
                Err(_) => 0.0,
            };

            if score >= self.config.gate.accept_score {
                return CycleStep::Execute {
                    candidate: proposal,
                    tier: AttemptTier::AiEscalated,
                };
            }
            // A proposal that fails validation is a failure signal for
            // its pattern, same as an execution failure would be
            self.record(
                trail,
                req,
                &proposal,
                path,
                AttemptTier::AiEscalated,
                AttemptOutcome::Rejected,
                probe_started.elapsed(),
            );
        }

        CycleStep::GiveUp
    }

    async fn execute_and_verify(
        &self,
        req: &PerformRequest,
        path: AttemptPath,
        tier: AttemptTier,
        candidate: Candidate,
        trail: &mut Vec<ResolutionAttempt>,
    ) -> CycleEnd {
        let attempt_started = Instant::now();

        let value = match timeout(
            self.config.exec_timeout,
            self.execute(&candidate, &req.action),
        )
        .await
        {
            Ok(Ok(value)) => value,
            Ok(Err(err)) => {
                debug!(element = %req.element, candidate = %candidate.locator, error = %err, "execution failed");
                self.record(
                    trail,
                    req,
                    &candidate,
                    path,
                    tier,
                    AttemptOutcome::ActionFailed,
                    attempt_started.elapsed(),
                );
                return CycleEnd::Failed;
            }
            Err(_) => {
                self.record(
                    trail,
                    req,
                    &candidate,
                    path,
                    tier,
                    AttemptOutcome::Timeout,
                    attempt_started.elapsed(),
                );
                return CycleEnd::Failed;
            }
        };

        let verified = match timeout(
            self.config.verify_timeout,
            req.verify.verify(self.surface.as_ref()),
        )
        .await
        {
            Ok(verified) => verified,
            Err(_) => {
                self.record(
                    trail,
                    req,
                    &candidate,
                    path,
                    tier,
                    AttemptOutcome::Timeout,
                    attempt_started.elapsed(),
                );
                return CycleEnd::Failed;
            }
        };

        let outcome = if verified {
            AttemptOutcome::Success
        } else {
            AttemptOutcome::VerifyFailed
        };
        self.record(
            trail,
            req,
            &candidate,
            path,
            tier,
            outcome,
            attempt_started.elapsed(),
        );

        if verified {
            CycleEnd::Verified(value)
        } else {
            CycleEnd::Failed
        }
    }

    async fn execute(
        &self,
        candidate: &Candidate,
        action: &Action,
    ) -> Result<Option<String>, SurfaceError> {
        let handle = self.surface.locate(&candidate.locator).await?;
        self.surface.act(&handle, action).await?;
        if matches!(action, Action::Extract) {
            Ok(Some(self.surface.read(&handle).await?))
        } else {
            Ok(None)
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &self,
        trail: &mut Vec<ResolutionAttempt>,
        req: &PerformRequest,
        candidate: &Candidate,
        path: AttemptPath,
        tier: AttemptTier,
        outcome: AttemptOutcome,
        elapsed: std::time::Duration,
    ) {
        let attempt = ResolutionAttempt::new(
            req.element.clone(),
            candidate.clone(),
            path,
            tier,
            outcome,
            elapsed,
        );
        debug!(%attempt, "attempt recorded");
        self.reinforce.on_attempt(&attempt);
        trail.push(attempt);
    }

    fn check_cancelled(
        &self,
        path: AttemptPath,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        if cancel.is_cancelled() {
            Err(EngineError::Cancelled(format!(
                "{} path cancelled",
                path.name()
            )))
        } else {
            Ok(())
        }
    }
}
