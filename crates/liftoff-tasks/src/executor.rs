//! Priority worker pools.
//!
//! Both execution contexts are a [`WorkerPool`]: the confined context is a
//! pool with a single thread, the pooled context has one worker per core.
//! Queued jobs run highest key first, FIFO among equal keys.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// A unit of work submitted to a pool
pub type Job = Box<dyn FnOnce() + Send + 'static>;

struct QueuedJob {
    key: i64,
    seq: u64,
    job: Job,
}

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.seq == other.seq
    }
}

impl Eq for QueuedJob {}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedJob {
    // Max-heap: higher key first, then lower sequence number
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .cmp(&other.key)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct Queue {
    heap: BinaryHeap<QueuedJob>,
    next_seq: u64,
    active: usize,
    closed: bool,
}

struct Shared {
    queue: Mutex<Queue>,
    available: Condvar,
    idle: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Errors from pool operations
#[derive(Debug, thiserror::Error)]
pub enum ExecutorError {
    /// Worker thread could not be spawned
    #[error("Failed to spawn worker thread for pool '{pool}': {source}")]
    Spawn {
        pool: String,
        #[source]
        source: std::io::Error,
    },

    /// The pool no longer accepts work
    #[error("Pool '{0}' is closed")]
    Closed(String),
}

/// Fixed-size thread pool with a priority queue
pub struct WorkerPool {
    name: String,
    threads: usize,
    shared: Arc<Shared>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    /// Spawn a pool with `threads` workers (at least one) named `<name>-<n>`
    pub fn new(name: impl Into<String>, threads: usize) -> Result<Self, ExecutorError> {
        let name = name.into();
        let threads = threads.max(1);
        let shared = Arc::new(Shared {
            queue: Mutex::new(Queue::default()),
            available: Condvar::new(),
            idle: Condvar::new(),
        });

        let mut handles = Vec::with_capacity(threads);
        for n in 0..threads {
            let worker_shared = shared.clone();
            let handle = std::thread::Builder::new()
                .name(format!("{}-{}", name, n))
                .spawn(move || worker_loop(&worker_shared))
                .map_err(|source| ExecutorError::Spawn {
                    pool: name.clone(),
                    source,
                })?;
            handles.push(handle);
        }

        debug!(pool = %name, threads, "worker pool started");
        Ok(Self {
            name,
            threads,
            shared,
            handles: Mutex::new(handles),
        })
    }

    /// Pool name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of worker threads
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Queue a job. Higher keys run first.
    pub fn submit(&self, key: i64, job: Job) -> Result<(), ExecutorError> {
        let mut queue = self.shared.lock();
        if queue.closed {
            return Err(ExecutorError::Closed(self.name.clone()));
        }
        let seq = queue.next_seq;
        queue.next_seq += 1;
        queue.heap.push(QueuedJob { key, seq, job });
        drop(queue);

        self.shared.available.notify_one();
        Ok(())
    }

    /// Jobs waiting for a worker
    pub fn queued(&self) -> usize {
        self.shared.lock().heap.len()
    }

    /// Stop accepting new jobs. Queued jobs still run; workers exit once the
    /// queue is empty. Never blocks, so it is safe to call from a worker.
    pub fn close(&self) {
        let mut queue = self.shared.lock();
        if !queue.closed {
            queue.closed = true;
            debug!(pool = %self.name, "worker pool closed");
        }
        drop(queue);
        self.shared.available.notify_all();
    }

    /// Close the pool and wait up to `grace` for queued and running jobs to
    /// finish, then join the workers. Returns false if the grace period ran
    /// out; the remaining workers are detached.
    ///
    /// Must not be called from one of this pool's own workers.
    pub fn shutdown(&self, grace: Duration) -> bool {
        self.close();

        let deadline = Instant::now() + grace;
        let queue = self.shared.lock();
        let (queue, timeout) = self
            .shared
            .idle
            .wait_timeout_while(queue, grace, |q| !q.heap.is_empty() || q.active > 0)
            .unwrap_or_else(|e| e.into_inner());
        let drained = !timeout.timed_out() || (queue.heap.is_empty() && queue.active == 0);
        drop(queue);

        if !drained {
            warn!(pool = %self.name, grace_secs = grace.as_secs(), "some tasks did not finish in time");
            return false;
        }

        let handles: Vec<JoinHandle<()>> = self
            .handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for handle in handles {
            if handle.join().is_err() {
                warn!(pool = %self.name, "worker thread panicked");
            }
        }

        debug!(
            pool = %self.name,
            remaining_ms = deadline.saturating_duration_since(Instant::now()).as_millis() as u64,
            "worker pool shut down"
        );
        true
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("name", &self.name)
            .field("threads", &self.threads)
            .finish_non_exhaustive()
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let job = {
            let mut queue = shared.lock();
            loop {
                if let Some(queued) = queue.heap.pop() {
                    queue.active += 1;
                    break queued.job;
                }
                if queue.closed {
                    return;
                }
                queue = shared
                    .available
                    .wait(queue)
                    .unwrap_or_else(|e| e.into_inner());
            }
        };

        // Jobs catch their own panics; this keeps the worker alive regardless.
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(job));

        let mut queue = shared.lock();
        queue.active -= 1;
        if queue.heap.is_empty() && queue.active == 0 {
            shared.idle.notify_all();
        }
    }
}
