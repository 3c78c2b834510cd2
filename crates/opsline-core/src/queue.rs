//! Bounded FIFO task queue with a fixed worker pool.
//!
//! Workers block on the channel rather than polling. Shutdown goes through a
//! `CancellationToken`: new work is refused, work already queued is drained,
//! and `shutdown` returns once every in-flight task has finished.

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

type Job = BoxFuture<'static, ()>;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("task queue is shutting down")]
    ShuttingDown,

    #[error("task queue is closed")]
    Closed,
}

/// Handle to a running task queue. Cheap to clone.
#[derive(Clone)]
pub struct TaskQueue {
    sender: mpsc::Sender<Job>,
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl TaskQueue {
    /// Spawn `workers` workers over a channel holding up to `capacity` jobs.
    ///
    /// One worker gives strict FIFO execution. With more, jobs are dequeued
    /// in FIFO order but may overlap.
    pub fn start(capacity: usize, workers: usize) -> Self {
        let (sender, receiver) = mpsc::channel::<Job>(capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();

        for worker in 0..workers.max(1) {
            tracker.spawn(worker_loop(worker, Arc::clone(&receiver), cancel.clone()));
        }
        tracker.close();

        tracing::debug!(capacity, workers, "task queue started");

        Self {
            sender,
            receiver,
            cancel,
            tracker,
        }
    }

    /// Queue a job, waiting for capacity if the channel is full.
    pub async fn enqueue<F>(&self, job: F) -> Result<(), QueueError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.cancel.is_cancelled() {
            return Err(QueueError::ShuttingDown);
        }
        self.sender
            .send(Box::pin(job))
            .await
            .map_err(|_| QueueError::Closed)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Refuse new work, drain the queue, and wait for in-flight jobs.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.wait().await;

        // Jobs that raced past the cancellation check after the workers exited.
        let mut receiver = self.receiver.lock().await;
        receiver.close();
        while let Ok(job) = receiver.try_recv() {
            job.await;
        }
        tracing::debug!("task queue drained");
    }
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("workers", &self.tracker.len())
            .field("shutting_down", &self.cancel.is_cancelled())
            .finish()
    }
}

async fn worker_loop(
    worker: usize,
    receiver: Arc<Mutex<mpsc::Receiver<Job>>>,
    cancel: CancellationToken,
) {
    loop {
        let job = {
            let mut rx = receiver.lock().await;
            tokio::select! {
                biased;
                job = rx.recv() => job,
                _ = cancel.cancelled() => None,
            }
        };
        match job {
            Some(job) => job.await,
            None => break,
        }
    }

    // Cancellation observed: run whatever is still queued.
    loop {
        let job = receiver.lock().await.try_recv().ok();
        match job {
            Some(job) => job.await,
            None => break,
        }
    }
    tracing::trace!(worker, "task queue worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn single_worker_runs_jobs_in_fifo_order() {
        let queue = TaskQueue::start(16, 1);
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        for i in 0..10 {
            let order = Arc::clone(&order);
            queue
                .enqueue(async move {
                    // Earlier jobs sleep longer; order must still hold.
                    tokio::time::sleep(Duration::from_millis(10 - i)).await;
                    order.lock().unwrap().push(i);
                })
                .await
                .unwrap();
        }

        queue.shutdown().await;
        assert_eq!(*order.lock().unwrap(), (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn shutdown_drains_queued_jobs() {
        let queue = TaskQueue::start(64, 2);
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..50 {
            let done = Arc::clone(&done);
            queue
                .enqueue(async move {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    done.fetch_add(1, Ordering::SeqCst);
                })
                .await
                .unwrap();
        }

        queue.shutdown().await;
        assert_eq!(done.load(Ordering::SeqCst), 50);
    }

    #[tokio::test]
    async fn enqueue_after_shutdown_is_refused() {
        let queue = TaskQueue::start(4, 1);
        queue.shutdown().await;
        assert!(queue.is_shutting_down());

        let err = queue.enqueue(async {}).await.unwrap_err();
        assert!(matches!(err, QueueError::ShuttingDown));
    }

    #[tokio::test]
    async fn workers_run_jobs_concurrently() {
        let queue = TaskQueue::start(8, 4);
        let (tx, mut rx) = tokio::sync::mpsc::channel::<()>(4);
        let barrier = Arc::new(tokio::sync::Barrier::new(4));

        for _ in 0..4 {
            let barrier = Arc::clone(&barrier);
            let tx = tx.clone();
            queue
                .enqueue(async move {
                    // Only passes if all four jobs are running at once.
                    barrier.wait().await;
                    let _ = tx.send(()).await;
                })
                .await
                .unwrap();
        }
        drop(tx);

        let received = tokio::time::timeout(Duration::from_secs(5), async {
            let mut n = 0;
            while rx.recv().await.is_some() {
                n += 1;
            }
            n
        })
        .await
        .expect("jobs should not deadlock");
        assert_eq!(received, 4);
        queue.shutdown().await;
    }

    #[tokio::test]
    async fn clones_share_the_same_queue() {
        let queue = TaskQueue::start(4, 1);
        let other = queue.clone();
        let done = Arc::new(AtomicUsize::new(0));

        let d = Arc::clone(&done);
        other
            .enqueue(async move {
                d.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();

        queue.shutdown().await;
        assert!(other.is_shutting_down());
        assert_eq!(done.load(Ordering::SeqCst), 1);
    }
}
