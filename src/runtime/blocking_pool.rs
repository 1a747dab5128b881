//! Blocking pool for executing synchronous operations.
//!
//! A fixed set of OS threads, separate from the event loop thread, that runs
//! blocking closures: opening files, and the positional transfers of the
//! portable completion backend.
//!
//! # Design
//!
//! Work is pushed onto a lock-free FIFO queue and picked up by whichever
//! worker wakes first. Idle workers park on a condition variable. A closure
//! that panics is contained to that closure; the worker keeps running.
//!
//! ## Shutdown
//!
//! Dropping the [`BlockingPool`] sets the shutdown flag, wakes every worker
//! and joins them. Workers drain the queue before exiting, so work submitted
//! before shutdown still runs.

#![allow(clippy::must_use_candidate)]

use crossbeam_queue::SegQueue;
use std::fmt;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How long an idle worker parks before re-checking the shutdown flag.
const PARK_TIMEOUT: Duration = Duration::from_millis(250);

type Work = Box<dyn FnOnce() + Send + 'static>;

/// A handle to the blocking pool that can be cloned and shared.
#[derive(Clone)]
pub struct BlockingPoolHandle {
    inner: Arc<PoolShared>,
}

impl fmt::Debug for BlockingPoolHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingPoolHandle")
            .field("threads", &self.inner.threads)
            .field(
                "pending_tasks",
                &self.inner.pending_count.load(Ordering::Relaxed),
            )
            .finish()
    }
}

/// The blocking pool for executing synchronous operations.
pub struct BlockingPool {
    inner: Arc<PoolShared>,
    workers: Vec<JoinHandle<()>>,
}

impl fmt::Debug for BlockingPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingPool")
            .field("threads", &self.inner.threads)
            .field("thread_name_prefix", &self.inner.thread_name_prefix)
            .field(
                "pending_tasks",
                &self.inner.pending_count.load(Ordering::Relaxed),
            )
            .finish()
    }
}

struct PoolShared {
    /// Number of worker threads.
    threads: usize,
    /// Thread name prefix.
    thread_name_prefix: String,
    /// Number of pending tasks in queue.
    pending_count: AtomicUsize,
    /// Work queue.
    queue: SegQueue<Work>,
    /// Shutdown flag.
    shutdown: AtomicBool,
    /// Condition variable for thread parking.
    condvar: Condvar,
    /// Mutex for condition variable.
    mutex: Mutex<()>,
}

impl PoolShared {
    fn push(&self, work: Work) {
        self.queue.push(work);
        self.pending_count.fetch_add(1, Ordering::Relaxed);
        let _guard = self.mutex.lock().unwrap_or_else(PoisonError::into_inner);
        self.condvar.notify_one();
    }

    fn notify_all(&self) {
        let _guard = self.mutex.lock().unwrap_or_else(PoisonError::into_inner);
        self.condvar.notify_all();
    }
}

impl BlockingPool {
    /// Creates a pool with `threads` workers named `{prefix}-{n}`.
    ///
    /// A request for zero threads is raised to one.
    ///
    /// # Errors
    ///
    /// Returns the OS error if a worker thread cannot be spawned.
    pub fn new(threads: usize, thread_name_prefix: impl Into<String>) -> io::Result<Self> {
        let threads = threads.max(1);
        let inner = Arc::new(PoolShared {
            threads,
            thread_name_prefix: thread_name_prefix.into(),
            pending_count: AtomicUsize::new(0),
            queue: SegQueue::new(),
            shutdown: AtomicBool::new(false),
            condvar: Condvar::new(),
            mutex: Mutex::new(()),
        });

        let mut pool = Self {
            inner,
            workers: Vec::with_capacity(threads),
        };
        for index in 0..threads {
            let inner = Arc::clone(&pool.inner);
            let name = format!("{}-{}", pool.inner.thread_name_prefix, index);
            // On failure the partially built pool is dropped, which joins
            // the workers already running.
            let handle = thread::Builder::new()
                .name(name)
                .spawn(move || worker_loop(&inner))?;
            pool.workers.push(handle);
        }

        tracing::debug!(
            threads,
            prefix = %pool.inner.thread_name_prefix,
            "blocking pool started"
        );
        Ok(pool)
    }

    /// Returns a cloneable handle to this pool.
    #[must_use]
    pub fn handle(&self) -> BlockingPoolHandle {
        BlockingPoolHandle {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Spawns a blocking task.
    pub fn spawn<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.push(Box::new(f));
    }

    /// Returns the number of worker threads.
    #[must_use]
    pub fn threads(&self) -> usize {
        self.inner.threads
    }

    /// Returns `true` if the pool is shut down.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }

    /// Initiates shutdown of the pool.
    ///
    /// Queued tasks still run; new tasks submitted afterwards are dropped
    /// unexecuted once the workers have exited.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        self.inner.notify_all();
    }
}

impl Drop for BlockingPool {
    fn drop(&mut self) {
        self.shutdown();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::warn!("blocking pool worker exited by panic");
            }
        }
    }
}

impl BlockingPoolHandle {
    /// Spawns a blocking task.
    pub fn spawn<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.inner.push(Box::new(f));
    }

    /// Returns `true` if the pool is shut down.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::Acquire)
    }
}

/// Runs queued work until shutdown is requested and the queue is empty.
fn worker_loop(inner: &PoolShared) {
    loop {
        if let Some(work) = inner.queue.pop() {
            inner.pending_count.fetch_sub(1, Ordering::Relaxed);
            if panic::catch_unwind(AssertUnwindSafe(work)).is_err() {
                tracing::warn!("blocking task panicked");
            }
            continue;
        }

        if inner.shutdown.load(Ordering::Acquire) {
            break;
        }

        let guard = inner.mutex.lock().unwrap_or_else(PoisonError::into_inner);
        // Re-check under the lock so a push between pop and park is not missed.
        if inner.queue.is_empty() && !inner.shutdown.load(Ordering::Acquire) {
            let _ = inner
                .condvar
                .wait_timeout(guard, PARK_TIMEOUT)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}
