//! Inbound `PerformTask` handling and the HTTP surface around it.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::pipeline::{ResolveError, StageJob};
use crate::pool::{PoolError, PoolHandle};
use crate::stats::{PipelineStats, StatsSnapshot};
use crate::task::Task;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformTaskRequest {
    /// JSON-encoded task.
    pub payload: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerformTaskResponse {
    pub success: bool,
}

impl PerformTaskResponse {
    fn accepted(success: bool) -> Self {
        Self { success }
    }
}

/// Validates tasks and hands them to the worker pool. Answers immediately;
/// `success` means accepted, not completed.
pub struct Dispatcher {
    pool: PoolHandle<StageJob>,
    stats: Arc<PipelineStats>,
}

impl Dispatcher {
    pub fn new(pool: PoolHandle<StageJob>, stats: Arc<PipelineStats>) -> Self {
        Self { pool, stats }
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn perform_task(&self, payload: &[u8]) -> PerformTaskResponse {
        let task: Task = match serde_json::from_slice(payload) {
            Ok(task) => task,
            Err(e) => {
                self.stats.record_malformed();
                warn!(error = %e, bytes = payload.len(), "Rejecting malformed task payload");
                return PerformTaskResponse::accepted(false);
            }
        };

        let slug = task.playlist.slug.clone();
        let job = match StageJob::resolve(task) {
            Ok(job) => job,
            Err(ResolveError::UnknownStage(name)) => {
                self.stats.record_unknown_stage();
                warn!(slug = %slug, stage = %name, "Unknown stage, ignoring task");
                return PerformTaskResponse::accepted(true);
            }
        };
        let stage = job.kind();

        match self.pool.submit(job) {
            Ok(()) => {
                self.stats.record_accepted();
                info!(slug = %slug, %stage, "Task accepted");
                PerformTaskResponse::accepted(true)
            }
            Err(e) => {
                match e {
                    PoolError::QueueFull => self.stats.record_queue_full(),
                    PoolError::Closed => self.stats.record_pool_closed(),
                }
                warn!(slug = %slug, %stage, error = %e, "Task rejected");
                PerformTaskResponse::accepted(false)
            }
        }
    }
}

/// `POST /rpc/PerformTask`, `GET /health`, `GET /stats`.
pub fn router(dispatcher: Arc<Dispatcher>) -> Router {
    Router::new()
        .route("/rpc/PerformTask", post(perform_task))
        .route("/health", get(health))
        .route("/stats", get(stats))
        .layer(TraceLayer::new_for_http())
        .with_state(dispatcher)
}

async fn perform_task(State(dispatcher): State<Arc<Dispatcher>>, body: Bytes) -> Json<PerformTaskResponse> {
    match serde_json::from_slice::<PerformTaskRequest>(&body) {
        Ok(request) => Json(dispatcher.perform_task(request.payload.as_bytes())),
        Err(e) => {
            dispatcher.stats.record_malformed();
            warn!(error = %e, "Rejecting malformed PerformTask request");
            Json(PerformTaskResponse::accepted(false))
        }
    }
}

async fn health() -> &'static str {
    "ok"
}

async fn stats(State(dispatcher): State<Arc<Dispatcher>>) -> Json<StatsSnapshot> {
    Json(dispatcher.stats())
}
