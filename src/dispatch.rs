//! Fixed-size worker pool for fire-and-forget background units.
//!
//! Units are submitted with [`Dispatcher::submit`] and run on one of
//! `workers` tokio tasks fed by a bounded queue. A unit's result is never
//! awaited by the submitter: an `Err` or a panic is logged with the unit's
//! name and otherwise ignored, and nothing is retried. When the queue is
//! full, `submit` waits for room.

use std::{
    any::Any,
    future::Future,
    panic::AssertUnwindSafe,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
};

use futures_util::FutureExt;
use thiserror::Error;
use tokio::{
    sync::{mpsc, oneshot, Mutex, Notify},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

type Unit = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

struct Job {
    id: u64,
    name: &'static str,
    unit: Unit,
    done: oneshot::Sender<TaskOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    Completed,
    Failed,
    Panicked,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("background dispatcher is shut down")]
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { workers: 8, queue_capacity: 256 }
    }
}

/// Returned by [`Dispatcher::submit`]. Dropping it is the normal case.
#[derive(Debug)]
pub struct TaskHandle {
    id: u64,
    name: &'static str,
    done: oneshot::Receiver<TaskOutcome>,
}

impl TaskHandle {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// `None` if the worker was torn down before reporting.
    pub async fn outcome(self) -> Option<TaskOutcome> {
        self.done.await.ok()
    }
}

struct Shared {
    next_id: AtomicU64,
    pending: AtomicUsize,
    idle: Notify,
}

impl Shared {
    fn finish_one(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<Job>,
    shared: Arc<Shared>,
}

/// Join handles of the pool; see [`Workers::shutdown`].
pub struct Workers {
    handles: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    pub fn start(config: PoolConfig) -> (Dispatcher, Workers) {
        let workers = config.workers.max(1);
        let queue_capacity = config.queue_capacity.max(1);

        let (tx, rx) = mpsc::channel(queue_capacity);
        let rx = Arc::new(Mutex::new(rx));
        let shared = Arc::new(Shared {
            next_id: AtomicU64::new(1),
            pending: AtomicUsize::new(0),
            idle: Notify::new(),
        });

        let handles = (0..workers)
            .map(|worker| tokio::spawn(work(worker, rx.clone(), shared.clone())))
            .collect();

        info!(workers, queue_capacity, "background dispatcher started");
        (Dispatcher { tx, shared }, Workers { handles })
    }

    pub async fn submit<F>(&self, name: &'static str, unit: F) -> Result<TaskHandle, DispatchError>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);
        let (done_tx, done_rx) = oneshot::channel();

        let permit = self.tx.reserve().await.map_err(|_| DispatchError::Closed)?;
        self.shared.pending.fetch_add(1, Ordering::SeqCst);
        permit.send(Job { id, name, unit: Box::pin(unit), done: done_tx });

        debug!(task_id = id, task = name, "background unit queued");
        Ok(TaskHandle { id, name, done: done_rx })
    }

    /// Units queued or running.
    pub fn pending(&self) -> usize {
        self.shared.pending.load(Ordering::SeqCst)
    }

    pub async fn wait_idle(&self) {
        loop {
            let idle = self.shared.idle.notified();
            if self.pending() == 0 {
                return;
            }
            idle.await;
        }
    }
}

impl Workers {
    /// Waits for every worker to exit. Workers stop once every
    /// [`Dispatcher`] clone is dropped and the queue has drained.
    pub async fn shutdown(self) {
        for handle in self.handles {
            if let Err(err) = handle.await {
                error!(error = %err, "background worker exited abnormally");
            }
        }
        info!("background dispatcher stopped");
    }
}

async fn work(worker: usize, rx: Arc<Mutex<mpsc::Receiver<Job>>>, shared: Arc<Shared>) {
    loop {
        let job = rx.lock().await.recv().await;
        let Some(Job { id, name, unit, done }) = job else {
            break;
        };

        let outcome = match AssertUnwindSafe(unit).catch_unwind().await {
            Ok(Ok(())) => {
                debug!(task_id = id, task = name, worker, "background unit completed");
                TaskOutcome::Completed
            }
            Ok(Err(err)) => {
                warn!(task_id = id, task = name, worker, error = %err, "background unit failed");
                TaskOutcome::Failed
            }
            Err(panic) => {
                error!(task_id = id, task = name, worker, panic = panic_message(&panic), "background unit panicked");
                TaskOutcome::Panicked
            }
        };

        let _ = done.send(outcome);
        shared.finish_one();
    }
}

fn panic_message(panic: &Box<dyn Any + Send>) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    async fn ok() -> anyhow::Result<()> {
        Ok(())
    }

    async fn explode() -> anyhow::Result<()> {
        panic!("kaboom")
    }

    fn pool(workers: usize, queue_capacity: usize) -> (Dispatcher, Workers) {
        Dispatcher::start(PoolConfig { workers, queue_capacity })
    }

    #[tokio::test]
    async fn test_failing_unit_is_isolated() {
        let (dispatcher, _workers) = pool(2, 8);

        let bad = dispatcher
            .submit("bad", async { Err::<(), _>(anyhow::anyhow!("nope")) })
            .await
            .unwrap();
        let good = dispatcher.submit("good", ok()).await.unwrap();

        assert_eq!(bad.outcome().await, Some(TaskOutcome::Failed));
        assert_eq!(good.outcome().await, Some(TaskOutcome::Completed));
    }

    #[tokio::test]
    async fn test_panicking_unit_does_not_kill_worker() {
        let (dispatcher, _workers) = pool(1, 8);

        let boom = dispatcher.submit("boom", explode()).await.unwrap();
        assert_eq!(boom.outcome().await, Some(TaskOutcome::Panicked));

        let after = dispatcher.submit("after", ok()).await.unwrap();
        assert_eq!(after.outcome().await, Some(TaskOutcome::Completed));
    }

    #[tokio::test]
    async fn test_concurrency_capped_at_worker_count() {
        let (dispatcher, _workers) = pool(2, 16);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for _ in 0..6 {
            let running = running.clone();
            let peak = peak.clone();
            dispatcher
                .submit("sleepy", async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok::<(), anyhow::Error>(())
                })
                .await
                .unwrap();
        }

        dispatcher.wait_idle().await;
        assert_eq!(dispatcher.pending(), 0);
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_full_queue_applies_backpressure() {
        let (dispatcher, _workers) = pool(1, 1);
        let (release_tx, release_rx) = oneshot::channel::<()>();

        dispatcher
            .submit("blocker", async move {
                let _ = release_rx.await;
                Ok::<(), anyhow::Error>(())
            })
            .await
            .unwrap();
        // give the worker time to take the blocker off the queue
        tokio::time::sleep(Duration::from_millis(20)).await;
        dispatcher.submit("queued", ok()).await.unwrap();

        let third = tokio::time::timeout(
            Duration::from_millis(50),
            dispatcher.submit("waits", ok()),
        )
        .await;
        assert!(third.is_err());

        release_tx.send(()).unwrap();
        dispatcher.wait_idle().await;
        assert_eq!(dispatcher.pending(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_drains_queue() {
        let (dispatcher, workers) = pool(1, 8);
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let done = done.clone();
            dispatcher
                .submit("count", async move {
                    done.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), anyhow::Error>(())
                })
                .await
                .unwrap();
        }
        drop(dispatcher);
        workers.shutdown().await;
        assert_eq!(done.load(Ordering::SeqCst), 3);
    }
}
