pub mod config;
pub mod dispatcher;
pub mod filter;
pub mod notify;
pub mod pipeline;
pub mod pool;
pub mod stats;
pub mod task;
pub mod traits;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

use std::sync::Arc;

pub use config::Config;
pub use dispatcher::{router, Dispatcher, PerformTaskRequest, PerformTaskResponse};
pub use pipeline::{Pipeline, StageJob};
pub use pool::{PoolError, PoolHandle, WorkerPool};
pub use stats::{PipelineStats, StageOutcome, StatsSnapshot};

/// Start a worker pool that runs every accepted job through `pipeline`, and
/// the dispatcher that feeds it.
pub fn start_worker(
    pipeline: Arc<Pipeline>,
    concurrency: usize,
    queue_capacity: usize,
) -> (Arc<Dispatcher>, WorkerPool) {
    let stats = pipeline.stats().clone();
    let (handle, pool) = WorkerPool::spawn(concurrency, queue_capacity, move |job: StageJob| {
        let pipeline = pipeline.clone();
        async move {
            pipeline.run(job).await;
        }
    });
    (Arc::new(Dispatcher::new(handle, stats)), pool)
}
