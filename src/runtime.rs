//! Process wiring
//!
//! Opens the persisted stores, assembles the discovery chain (local
//! heuristic first, caller-supplied backends after), starts the worker
//! pool and a background flush task, and ties everything to one
//! shutdown token.

use std::sync::Arc;

use discovery_hub::{DiscoveryBackend, DiscoveryHub, HeuristicBackend};
use failure_heatmap::{FailureHeatmap, SharedFailureHeatmap};
use interaction_engine::{EngineError, EnginePool, PerformOutcome, PerformRequest, SurfaceFactory};
use selector_memory::{KnowledgeStore, SharedKnowledgeStore};
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::catalogue;
use crate::config::AppConfig;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("failed to open storage: {0}")]
    Storage(#[from] std::io::Error),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// A running sitepilot process: pool + shared stores + flush task
pub struct Runtime {
    store: SharedKnowledgeStore,
    heatmap: SharedFailureHeatmap,
    pool: EnginePool,
    flusher: JoinHandle<()>,
    shutdown: CancellationToken,
}

impl Runtime {
    /// Open stores and start the pool. `extra_backends` slot in after
    /// the built-in heuristic backend, typically remote multimodal
    /// providers.
    pub async fn start(
        config: &AppConfig,
        factory: Arc<dyn SurfaceFactory>,
        extra_backends: Vec<Arc<dyn DiscoveryBackend>>,
    ) -> Result<Self, RuntimeError> {
        let store = Arc::new(KnowledgeStore::with_persistence(
            config.knowledge_path(),
            config.store,
        )?);
        let heatmap = Arc::new(FailureHeatmap::with_persistence(
            config.heatmap_path(),
            config.heatmap,
        )?);

        let mut backends: Vec<Arc<dyn DiscoveryBackend>> = vec![Arc::new(HeuristicBackend::new())];
        backends.extend(extra_backends);
        let discovery = Arc::new(
            DiscoveryHub::new(backends).with_usability_floor(config.discovery_usability_floor),
        );

        let pool = EnginePool::start(
            factory,
            store.clone(),
            heatmap.clone(),
            discovery,
            config.engine,
            config.workers,
        )
        .await?;

        let shutdown = CancellationToken::new();
        let flusher = tokio::spawn(flush_loop(
            store.clone(),
            heatmap.clone(),
            config.flush_interval(),
            shutdown.child_token(),
        ));

        info!(
            storage = %config.storage_root.display(),
            workers = config.workers,
            known_elements = store.elements().len(),
            "runtime started"
        );
        Ok(Self {
            store,
            heatmap,
            pool,
            flusher,
            shutdown,
        })
    }

    pub fn store(&self) -> &SharedKnowledgeStore {
        &self.store
    }

    pub fn heatmap(&self) -> &SharedFailureHeatmap {
        &self.heatmap
    }

    /// Perform a request through the pool, filling in the catalogue
    /// hint when the caller did not set one.
    pub async fn perform(&self, mut req: PerformRequest) -> Result<PerformOutcome, EngineError> {
        if let Some(hint) = catalogue::task_hint(&req.element) {
            req.task_hint = hint.to_string();
        }
        self.pool.submit(req).await
    }

    /// Drain the pool, stop the flusher, flush once more.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        self.pool.shutdown().await;
        if let Err(err) = self.flusher.await {
            warn!(error = %err, "flush task did not stop cleanly");
        }
        if let Err(err) = self.store.persist_now() {
            warn!(error = %err, "final knowledge flush failed");
        }
        if let Err(err) = self.heatmap.persist_now() {
            warn!(error = %err, "final heatmap flush failed");
        }
        info!("runtime stopped");
    }
}

async fn flush_loop(
    store: SharedKnowledgeStore,
    heatmap: SharedFailureHeatmap,
    interval: std::time::Duration,
    shutdown: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = ticker.tick() => {
                heatmap.prune_expired();
                if let Err(err) = store.persist_now() {
                    warn!(error = %err, "periodic knowledge flush failed");
                }
                if let Err(err) = heatmap.persist_now() {
                    warn!(error = %err, "periodic heatmap flush failed");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use exec_surface::{
        Action, ExecutionSurface, ScriptedElement, ScriptedSurface, SurfaceError,
    };
    use sitepilot_core_types::{Locator, LogicalElement};

    struct SharedScripted(Arc<ScriptedSurface>);

    #[async_trait]
    impl SurfaceFactory for SharedScripted {
        async fn create(&self) -> Result<Arc<dyn ExecutionSurface>, SurfaceError> {
            Ok(self.0.clone())
        }
    }

    fn test_config(dir: &std::path::Path) -> AppConfig {
        AppConfig {
            storage_root: dir.to_path_buf(),
            workers: 1,
            ..AppConfig::default()
        }
    }

    #[tokio::test]
    async fn test_learned_state_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let surface = Arc::new(ScriptedSurface::new());
        surface.add_element(ScriptedElement::new(
            Locator::selector("#login-button"),
            "Log in",
        ));
        let element = LogicalElement::new("login", "login_button");

        {
            let runtime = Runtime::start(
                &test_config(dir.path()),
                Arc::new(SharedScripted(surface.clone())),
                Vec::new(),
            )
            .await
            .unwrap();

            // Cold start: heals through the heuristic backend
            let outcome = runtime
                .perform(PerformRequest::new(element.clone(), Action::Click))
                .await
                .unwrap();
            assert!(outcome.attempts >= 1);
            runtime.shutdown().await;
        }

        let runtime = Runtime::start(
            &test_config(dir.path()),
            Arc::new(SharedScripted(surface)),
            Vec::new(),
        )
        .await
        .unwrap();
        let learned = runtime.store().top_candidate(&element).unwrap();
        assert_eq!(learned.locator.selector_value(), Some("#login-button"));
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_catalogue_hint_applied() {
        let dir = tempfile::tempdir().unwrap();
        let surface = Arc::new(ScriptedSurface::new());
        surface.add_element(ScriptedElement::new(
            Locator::selector("#cookie-accept-button"),
            "Accept",
        ));
        let runtime = Runtime::start(
            &test_config(dir.path()),
            Arc::new(SharedScripted(surface)),
            Vec::new(),
        )
        .await
        .unwrap();

        let req = PerformRequest::new(
            LogicalElement::new("login", "cookie_accept_button"),
            Action::Click,
        );
        runtime.perform(req).await.unwrap();
        runtime.shutdown().await;
    }
}
