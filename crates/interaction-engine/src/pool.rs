//! Bounded worker pool
//!
//! N workers, each owning its own surface session and engine over the
//! process-wide knowledge store and heatmap. Requests queue on a
//! bounded channel, so concurrency is capped by the worker count and
//! submission backpressures instead of growing unbounded.

use std::sync::Arc;

use async_trait::async_trait;
use candidate_gate::LocalProbeGate;
use discovery_hub::DiscoveryHub;
use exec_surface::{ExecutionSurface, SurfaceError};
use failure_heatmap::SharedFailureHeatmap;
use selector_memory::SharedKnowledgeStore;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::engine::InteractionEngine;
use crate::errors::EngineError;
use crate::request::{PerformOutcome, PerformRequest};

/// Default number of workers
pub const DEFAULT_POOL_SIZE: usize = 5;

/// Creates one surface session per worker. Sessions are never shared:
/// a handle resolved in one session is meaningless in another.
#[async_trait]
pub trait SurfaceFactory: Send + Sync {
    async fn create(&self) -> Result<Arc<dyn ExecutionSurface>, SurfaceError>;
}

struct Job {
    req: PerformRequest,
    reply: oneshot::Sender<Result<PerformOutcome, EngineError>>,
}

/// Fixed-size pool of engine workers
pub struct EnginePool {
    tx: mpsc::Sender<Job>,
    workers: Vec<JoinHandle<()>>,
    shutdown: CancellationToken,
}

impl EnginePool {
    /// Spin up `workers` workers, one surface session each.
    pub async fn start(
        factory: Arc<dyn SurfaceFactory>,
        store: SharedKnowledgeStore,
        heatmap: SharedFailureHeatmap,
        discovery: Arc<DiscoveryHub>,
        config: EngineConfig,
        workers: usize,
    ) -> Result<Self, EngineError> {
        let workers = workers.max(1);
        let (tx, rx) = mpsc::channel::<Job>(workers * 2);
        let rx = Arc::new(Mutex::new(rx));
        let shutdown = CancellationToken::new();

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let surface = factory
                .create()
                .await
                .map_err(|err| EngineError::Internal(format!("surface session: {err}")))?;
            let gate = Arc::new(LocalProbeGate::new(surface.clone()));
            let engine = InteractionEngine::new(
                surface,
                store.clone(),
                heatmap.clone(),
                gate,
                discovery.clone(),
                config,
            );
            handles.push(tokio::spawn(worker_loop(
                worker_id,
                engine,
                rx.clone(),
                shutdown.child_token(),
            )));
        }

        info!(workers, "engine pool started");
        Ok(Self {
            tx,
            workers: handles,
            shutdown,
        })
    }

    /// Submit a request and wait for its outcome. Backpressures when
    /// all workers are busy and the queue is full.
    pub async fn submit(&self, req: PerformRequest) -> Result<PerformOutcome, EngineError> {
        let (reply, outcome) = oneshot::channel();
        self.tx
            .send(Job { req, reply })
            .await
            .map_err(|_| EngineError::Internal("pool is shut down".to_string()))?;
        outcome
            .await
            .map_err(|_| EngineError::Internal("worker dropped request".to_string()))?
    }

    /// Stop accepting work, let in-flight requests finish, join workers.
    pub async fn shutdown(self) {
        drop(self.tx);
        self.shutdown.cancel();
        for handle in self.workers {
            if let Err(err) = handle.await {
                warn!(error = %err, "pool worker did not shut down cleanly");
            }
        }
        info!("engine pool stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    engine: InteractionEngine,
    rx: Arc<Mutex<mpsc::Receiver<Job>>>,
    shutdown: CancellationToken,
) {
    loop {
        // Biased toward the queue so already-submitted work drains
        // before a shutdown signal is honored
        let job = {
            let mut rx = rx.lock().await;
            tokio::select! {
                biased;
                job = rx.recv() => job,
                _ = shutdown.cancelled() => None,
            }
        };
        let Some(job) = job else {
            debug!(worker_id, "worker stopping");
            return;
        };

        debug!(worker_id, element = %job.req.element, "worker picked up request");
        let outcome = engine.perform(job.req).await;
        // Caller may have given up waiting; nothing to do about it
        let _ = job.reply.send(outcome);
    }
}
