//! Background thread pool that runs fetch jobs.
//!
//! Uses work-stealing deques:
//! - External jobs go through a global injector
//! - Idle workers steal from each other
//! - No lock contention between workers
//!
//! Fetches never run on the caller's (rendering) thread. There is no
//! cancellation: once a job is queued it runs to completion.

use crossbeam::deque::{Injector, Stealer, Worker};
use log::{debug, error, trace};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crate::entities::traits::WorkerPool;

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Fixed-size fetch pool.
///
/// # Example
/// ```ignore
/// let workers = Workers::new(4);
/// workers.execute(move || {
///     let bytes = source.get(&request);
///     // hand result back to the coordinator
/// });
/// ```
pub struct Workers {
    injector: Arc<Injector<Job>>,
    handles: Vec<thread::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    /// Jobs queued or running
    pending: Arc<AtomicUsize>,
}

impl Workers {
    /// Spawn `num_threads` workers (at least one).
    pub fn new(num_threads: usize) -> Self {
        let num_threads = num_threads.max(1);
        let injector: Arc<Injector<Job>> = Arc::new(Injector::new());
        let shutdown = Arc::new(AtomicBool::new(false));
        let pending = Arc::new(AtomicUsize::new(0));

        let locals: Vec<Worker<Job>> = (0..num_threads).map(|_| Worker::new_fifo()).collect();
        let stealers: Vec<Stealer<Job>> = locals.iter().map(|w| w.stealer()).collect();
        let mut handles = Vec::with_capacity(num_threads);

        for (worker_id, local) in locals.into_iter().enumerate() {
            let injector = Arc::clone(&injector);
            let shutdown = Arc::clone(&shutdown);
            let pending = Arc::clone(&pending);
            let stealers = stealers.clone();

            let spawned = thread::Builder::new()
                .name(format!("picker-fetch-{}", worker_id))
                .spawn(move || {
                    trace!("Worker {} started", worker_id);
                    loop {
                        let job = local
                            .pop()
                            .or_else(|| injector.steal_batch_and_pop(&local).success())
                            .or_else(|| stealers.iter().find_map(|s| s.steal().success()));

                        if let Some(job) = job {
                            job();
                            pending.fetch_sub(1, Ordering::AcqRel);
                            continue;
                        }

                        if shutdown.load(Ordering::Relaxed) {
                            break;
                        }

                        // Nothing to do - short sleep instead of spinning
                        thread::sleep(Duration::from_millis(1));
                    }
                    trace!("Worker {} stopped", worker_id);
                });

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => error!("Failed to spawn fetch worker {}: {}", worker_id, e),
            }
        }

        if handles.is_empty() {
            error!("No fetch worker could be spawned, jobs will run on one-off threads");
        } else {
            debug!("Workers initialized: {} threads", handles.len());
        }

        Self {
            injector,
            handles,
            shutdown,
            pending,
        }
    }

    /// Default size: 75% of cores, leaving room for the render thread
    pub fn default_threads() -> usize {
        (num_cpus::get() * 3 / 4).max(1)
    }

    /// Queue closure for execution on a worker thread.
    pub fn execute<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.pending.fetch_add(1, Ordering::AcqRel);
        if self.handles.is_empty() {
            self.spawn_one_off(Box::new(f));
            return;
        }
        self.injector.push(Box::new(f));
    }

    /// Pool without threads: give each job its own short-lived thread
    fn spawn_one_off(&self, job: Job) {
        let pending = Arc::clone(&self.pending);
        let spawned = thread::Builder::new()
            .name("picker-fetch-fallback".into())
            .spawn(move || {
                job();
                pending.fetch_sub(1, Ordering::AcqRel);
            });
        if let Err(e) = spawned {
            // Job is dropped here; its waiters see the fetch as abandoned
            self.pending.fetch_sub(1, Ordering::AcqRel);
            error!("Failed to spawn fallback fetch thread: {}", e);
        }
    }

    /// Jobs queued or still running
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    pub fn threads(&self) -> usize {
        self.handles.len()
    }
}

impl Drop for Workers {
    fn drop(&mut self) {
        let num_threads = self.handles.len();
        trace!("Workers shutting down ({} threads)...", num_threads);

        self.shutdown.store(true, Ordering::SeqCst);

        // Queued jobs still drain before a worker sees the flag. Bounded wait,
        // a stuck fetch must not hang teardown.
        let deadline = Instant::now() + Duration::from_millis(500);
        let current = thread::current().id();
        for handle in std::mem::take(&mut self.handles) {
            // Last owner released inside a job: this worker exits on its own
            // once the job returns and it sees the flag
            if handle.thread().id() == current {
                continue;
            }
            while !handle.is_finished() {
                if Instant::now() >= deadline {
                    trace!("Shutdown timeout reached, detaching remaining workers");
                    return;
                }
                thread::sleep(Duration::from_millis(1));
            }
            let _ = handle.join();
        }

        trace!("All {} workers stopped", num_threads);
    }
}

impl std::fmt::Debug for Workers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workers")
            .field("threads", &self.handles.len())
            .field("pending", &self.pending())
            .finish()
    }
}

impl WorkerPool for Workers {
    fn execute(&self, job: Box<dyn FnOnce() + Send + 'static>) {
        Workers::execute(self, job)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runs_jobs_off_caller_thread() {
        let workers = Workers::new(2);
        let (tx, rx) = crossbeam_channel::unbounded();
        let caller = thread::current().id();

        for i in 0..8 {
            let tx = tx.clone();
            workers.execute(move || {
                let _ = tx.send((i, thread::current().id()));
            });
        }

        let mut seen: Vec<u32> = Vec::new();
        for _ in 0..8 {
            let (i, id) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
            assert_ne!(id, caller);
            seen.push(i);
        }
        seen.sort();
        assert_eq!(seen, (0..8).collect::<Vec<_>>());
    }

    #[test]
    fn test_last_owner_dropped_on_worker_thread() {
        let workers = Arc::new(Workers::new(2));
        let owned = Arc::clone(&workers);
        let (go_tx, go_rx) = crossbeam_channel::bounded::<()>(1);
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);

        workers.execute(Box::new(move || {
            go_rx.recv_timeout(Duration::from_secs(5)).unwrap();
            let start = Instant::now();
            drop(owned);
            let _ = done_tx.send(start.elapsed());
        }));
        drop(workers);
        go_tx.send(()).unwrap();

        let elapsed = done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(elapsed < Duration::from_millis(250), "drop on own worker took {:?}", elapsed);
    }

    #[test]
    fn test_jobs_run_when_no_thread_spawned() {
        let workers = Workers {
            injector: Arc::new(Injector::new()),
            handles: Vec::new(),
            shutdown: Arc::new(AtomicBool::new(false)),
            pending: Arc::new(AtomicUsize::new(0)),
        };
        let (tx, rx) = crossbeam_channel::unbounded();
        let caller = thread::current().id();
        for i in 0..3 {
            let tx = tx.clone();
            workers.execute(move || {
                let _ = tx.send((i, thread::current().id()));
            });
        }
        for _ in 0..3 {
            let (_, id) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
            assert_ne!(id, caller);
        }
        let deadline = Instant::now() + Duration::from_secs(5);
        while workers.pending() != 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(workers.pending(), 0);
    }

    #[test]
    fn test_zero_threads_clamped_to_one() {
        let workers = Workers::new(0);
        assert_eq!(workers.threads(), 1);
    }

    #[test]
    fn test_pending_drops_back_to_zero() {
        let workers = Workers::new(1);
        let (tx, rx) = crossbeam_channel::bounded(1);
        workers.execute(move || {
            let _ = tx.send(());
        });
        rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while workers.pending() != 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(workers.pending(), 0);
    }
}
