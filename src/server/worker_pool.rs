use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::debug;

use crate::common::{Result, ServerError};

/// A unit of work submitted to the pool
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// WorkerPool manages a fixed set of worker threads consuming a FIFO task
/// queue. `submit` never blocks; workers run one task at a time outside
/// any queue lock. On drop the shutdown flag is raised and every worker is
/// joined; tasks still queued at that point are discarded.
pub struct WorkerPool {
    /// Channel sender for queuing tasks
    task_sender: Sender<Task>,
    /// Flag to signal shutdown
    shutdown: Arc<AtomicBool>,
    /// Handles to the worker threads
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Creates a pool with `size` worker threads.
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "worker pool needs at least one thread");

        let (task_sender, task_receiver) = unbounded::<Task>();
        let shutdown = Arc::new(AtomicBool::new(false));

        let handles = (0..size)
            .map(|_| {
                let receiver = task_receiver.clone();
                let shutdown = Arc::clone(&shutdown);
                thread::spawn(move || Self::worker_loop(receiver, shutdown))
            })
            .collect();

        debug!(size, "worker pool started");

        Self {
            task_sender,
            shutdown,
            handles,
        }
    }

    /// Appends a task to the queue and wakes one waiting worker.
    pub fn submit(&self, task: impl FnOnce() + Send + 'static) -> Result<()> {
        self.task_sender
            .send(Box::new(task))
            .map_err(|e| ServerError::Channel(format!("failed to submit task: {e}")))
    }

    /// Returns the number of worker threads.
    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// The worker thread function: run queued tasks until shutdown.
    fn worker_loop(receiver: Receiver<Task>, shutdown: Arc<AtomicBool>) {
        loop {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }

            match receiver.recv_timeout(Duration::from_millis(100)) {
                Ok(task) => task(),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);

        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    #[test]
    fn test_worker_pool_runs_all_tasks() {
        let pool = WorkerPool::new(4);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..100 {
            let counter = Arc::clone(&counter);
            pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        }

        let deadline = Instant::now() + Duration::from_secs(5);
        while counter.load(Ordering::SeqCst) < 100 {
            assert!(Instant::now() < deadline, "tasks did not finish in time");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_worker_pool_size() {
        let pool = WorkerPool::new(3);
        assert_eq!(pool.size(), 3);
    }

    #[test]
    fn test_worker_pool_joins_on_drop() {
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let pool = WorkerPool::new(2);
            for _ in 0..10 {
                let counter = Arc::clone(&counter);
                pool.submit(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
            }
            thread::sleep(Duration::from_millis(200));
        }
        // Whatever ran, the pool's threads are gone and nothing panicked.
        assert!(counter.load(Ordering::SeqCst) <= 10);
    }
}
