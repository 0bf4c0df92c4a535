//! Bounded worker pool.
//!
//! Jobs wait in a fixed-capacity queue and run with at most `concurrency`
//! executing at once. Submission never waits: a full queue rejects the job.

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{error, info};

pub const DEFAULT_CONCURRENCY: usize = 5;
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("worker queue is full")]
    QueueFull,

    #[error("worker pool is shut down")]
    Closed,
}

/// Submission side of the pool. Cheap to clone.
pub struct PoolHandle<J> {
    tx: mpsc::Sender<J>,
}

impl<J> Clone for PoolHandle<J> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<J> PoolHandle<J> {
    pub fn submit(&self, job: J) -> Result<(), PoolError> {
        self.tx.try_send(job).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PoolError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => PoolError::Closed,
        })
    }
}

/// Owner side of the pool, used to shut it down.
pub struct WorkerPool {
    shutdown: oneshot::Sender<()>,
    runner: JoinHandle<()>,
}

impl WorkerPool {
    /// Start the pool. Every job is passed to `handler`; the returned future
    /// runs on its own task while it holds one of the `concurrency` slots.
    pub fn spawn<J, F, Fut>(concurrency: usize, queue_capacity: usize, handler: F) -> (PoolHandle<J>, Self)
    where
        J: Send + 'static,
        F: Fn(J) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let (shutdown, shutdown_rx) = oneshot::channel();
        let runner = tokio::spawn(run(rx, shutdown_rx, concurrency.max(1), handler));
        (PoolHandle { tx }, Self { shutdown, runner })
    }

    /// Stop accepting jobs, then wait for queued and running jobs to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(e) = self.runner.await {
            error!(error = %e, "Worker pool runner failed");
        }
    }
}

async fn run<J, F, Fut>(
    mut rx: mpsc::Receiver<J>,
    mut shutdown: oneshot::Receiver<()>,
    concurrency: usize,
    handler: F,
) where
    J: Send + 'static,
    F: Fn(J) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let slots = Arc::new(Semaphore::new(concurrency));
    let mut running = JoinSet::new();
    let mut closing = false;

    loop {
        // Take a slot before taking a job, so waiting jobs stay in the queue
        // and count against its capacity.
        let permit = match slots.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };

        let next = if closing {
            rx.recv().await
        } else {
            tokio::select! {
                job = rx.recv() => job,
                _ = &mut shutdown => {
                    info!(queued = rx.len(), running = running.len(), "Worker pool draining");
                    rx.close();
                    closing = true;
                    continue;
                }
            }
        };
        let Some(job) = next else { break };

        let work = handler(job);
        running.spawn(async move {
            let _permit = permit;
            work.await;
        });

        while let Some(done) = running.try_join_next() {
            log_join(done);
        }
    }

    while let Some(done) = running.join_next().await {
        log_join(done);
    }
    info!("Worker pool stopped");
}

fn log_join(result: Result<(), JoinError>) {
    if let Err(e) = result {
        if e.is_panic() {
            error!(error = %e, "Worker task panicked");
        } else {
            error!(error = %e, "Worker task cancelled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn runs_every_submitted_job() {
        let done = Arc::new(AtomicUsize::new(0));
        let counter = done.clone();
        let (handle, pool) = WorkerPool::spawn(2, 10, move |n: usize| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(n, Ordering::SeqCst);
            }
        });

        for n in 1..=4 {
            handle.submit(n).unwrap();
        }
        pool.shutdown().await;
        assert_eq!(done.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn concurrency_is_bounded() {
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let (a, p) = (active.clone(), peak.clone());
        let (handle, pool) = WorkerPool::spawn(2, 10, move |_: ()| {
            let (active, peak) = (a.clone(), p.clone());
            async move {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }
        });

        for _ in 0..6 {
            handle.submit(()).unwrap();
        }
        pool.shutdown().await;
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn full_queue_rejects() {
        let (release_tx, release_rx) = tokio::sync::watch::channel(false);
        let (handle, pool) = WorkerPool::spawn(1, 1, move |_: ()| {
            let mut release = release_rx.clone();
            async move {
                let _ = release.wait_for(|go| *go).await;
            }
        });

        // One job occupies the only slot, one sits in the queue, the rest
        // have nowhere to go.
        let mut results = Vec::new();
        for _ in 0..5 {
            results.push(handle.submit(()));
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(
            results,
            vec![
                Ok(()),
                Ok(()),
                Err(PoolError::QueueFull),
                Err(PoolError::QueueFull),
                Err(PoolError::QueueFull),
            ]
        );

        release_tx.send(true).unwrap();
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn submit_after_shutdown_is_closed() {
        let (handle, pool) = WorkerPool::spawn(1, 4, |_: ()| async {});
        pool.shutdown().await;
        assert_eq!(handle.submit(()), Err(PoolError::Closed));
    }

    #[tokio::test]
    async fn panicking_job_does_not_stop_the_pool() {
        let done = Arc::new(AtomicUsize::new(0));
        let counter = done.clone();
        let (handle, pool) = WorkerPool::spawn(1, 4, move |fail: bool| {
            let counter = counter.clone();
            async move {
                if fail {
                    panic!("boom");
                }
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        handle.submit(true).unwrap();
        handle.submit(false).unwrap();
        pool.shutdown().await;
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }
}
