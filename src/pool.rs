use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

/// Error emitted by a task, or recovered from its panic.
pub type TaskError = Box<dyn std::error::Error + Send + Sync>;

/// Boxed unit of work. Tasks receive the pool's cancellation token so long
/// operations can be aborted mid-flight.
pub type Task<T> = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, Result<T, TaskError>> + Send>;

#[derive(Debug, thiserror::Error)]
#[error("task execution panicked: {0}")]
pub struct TaskPanic(pub String);

#[derive(Debug, thiserror::Error)]
#[error("worker pool is shut down")]
pub struct PoolClosed;

/// Receiving ends of a pool's output channels. Handed out once at
/// construction; the pipeline controller is the single consumer.
pub struct PoolReceivers<T> {
    pub results: mpsc::UnboundedReceiver<T>,
    pub errors: mpsc::UnboundedReceiver<TaskError>,
}

/// Fixed-size pool of eagerly started workers.
///
/// Tasks are queued with [`add_task`](WorkerPool::add_task); successful
/// results and errors are published on separate channels. A panicking task
/// is caught and converted into an error on the errors channel, so one bad
/// page never takes the crawl down. Cancelling the token stops every worker
/// once its current task finishes.
pub struct WorkerPool<T> {
    task_tx: mpsc::UnboundedSender<Task<T>>,
}

impl<T: Send + 'static> WorkerPool<T> {
    pub fn new(max_workers: usize, cancel: CancellationToken) -> (Self, PoolReceivers<T>) {
        let (task_tx, task_rx) = mpsc::unbounded_channel::<Task<T>>();
        let task_rx = Arc::new(Mutex::new(task_rx));
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let (errors_tx, errors_rx) = mpsc::unbounded_channel();

        for _ in 0..max_workers.max(1) {
            tokio::spawn(worker_loop(
                Arc::clone(&task_rx),
                results_tx.clone(),
                errors_tx.clone(),
                cancel.clone(),
            ));
        }

        (
            Self { task_tx },
            PoolReceivers {
                results: results_rx,
                errors: errors_rx,
            },
        )
    }

    pub fn add_task(&self, task: Task<T>) -> Result<(), PoolClosed> {
        self.task_tx.send(task).map_err(|_| PoolClosed)
    }
}

async fn worker_loop<T: Send + 'static>(
    task_rx: Arc<Mutex<mpsc::UnboundedReceiver<Task<T>>>>,
    results_tx: mpsc::UnboundedSender<T>,
    errors_tx: mpsc::UnboundedSender<TaskError>,
    cancel: CancellationToken,
) {
    loop {
        // The lock is held only while waiting for the next task, never while
        // running one, so workers drain the queue in parallel.
        let task = {
            let mut rx = task_rx.lock().await;
            tokio::select! {
                _ = cancel.cancelled() => return,
                task = rx.recv() => match task {
                    Some(task) => task,
                    None => return,
                },
            }
        };

        match AssertUnwindSafe(task(cancel.clone())).catch_unwind().await {
            Ok(Ok(result)) => {
                let _ = results_tx.send(result);
            }
            Ok(Err(e)) => {
                let _ = errors_tx.send(e);
            }
            Err(payload) => {
                let _ = errors_tx.send(Box::new(TaskPanic(panic_message(payload))));
            }
        }
    }
}

pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ok_task(value: u32) -> Task<u32> {
        Box::new(move |_cancel| async move { Ok(value) }.boxed())
    }

    #[tokio::test]
    async fn test_results_are_published() {
        let cancel = CancellationToken::new();
        let (pool, mut rx) = WorkerPool::new(4, cancel.clone());

        for i in 0..10 {
            pool.add_task(ok_task(i)).unwrap();
        }

        let mut results = Vec::new();
        for _ in 0..10 {
            results.push(rx.results.recv().await.unwrap());
        }
        results.sort_unstable();
        assert_eq!(results, (0..10).collect::<Vec<_>>());

        cancel.cancel();
    }

    #[tokio::test]
    async fn test_errors_are_published() {
        let cancel = CancellationToken::new();
        let (pool, mut rx) = WorkerPool::<u32>::new(2, cancel.clone());

        pool.add_task(Box::new(|_cancel| {
            async { Err::<u32, TaskError>("boom".into()) }.boxed()
        }))
        .unwrap();

        let error = rx.errors.recv().await.unwrap();
        assert_eq!(error.to_string(), "boom");

        cancel.cancel();
    }

    #[tokio::test]
    async fn test_panic_is_converted_to_error() {
        let cancel = CancellationToken::new();
        let (pool, mut rx) = WorkerPool::<u32>::new(2, cancel.clone());

        let panicking: Task<u32> =
            Box::new(|_cancel| async { panic!("do request panic") }.boxed());
        pool.add_task(panicking).unwrap();

        let error = rx.errors.recv().await.unwrap();
        assert_eq!(
            error.to_string(),
            "task execution panicked: do request panic"
        );

        // The pool keeps working after a panic.
        pool.add_task(ok_task(7)).unwrap();
        assert_eq!(rx.results.recv().await.unwrap(), 7);

        cancel.cancel();
    }

    #[tokio::test]
    async fn test_cancellation_stops_workers() {
        let cancel = CancellationToken::new();
        let (pool, mut rx) = WorkerPool::<u32>::new(2, cancel.clone());

        cancel.cancel();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Queued work is never picked up once the token fires.
        let _ = pool.add_task(ok_task(1));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.results.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_task_receives_cancellation_token() {
        let cancel = CancellationToken::new();
        let (pool, mut rx) = WorkerPool::<bool>::new(1, cancel.clone());

        pool.add_task(Box::new(|token| {
            async move { Ok(!token.is_cancelled()) }.boxed()
        }))
        .unwrap();

        assert!(rx.results.recv().await.unwrap());
        cancel.cancel();
    }
}
