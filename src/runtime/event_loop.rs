//! Single-threaded completion loop.
//!
//! [`EventLoop::block_on`] drives one future on the calling thread. While the
//! future is pending, the thread blocks in [`Proactor::poll`]; every
//! completion the port yields is stored in its slot and wakes the task that
//! awaits it. Application code never runs in parallel: concurrency comes from
//! several transfers being in flight on the port at once, each resuming its
//! own waiter.
//!
//! Wakes from other threads (blocking pool workers) post a wake packet so a
//! parked `poll` returns promptly.

use crate::error::{Error, ErrorKind, Result};
use crate::runtime::blocking_pool::{BlockingPool, BlockingPoolHandle};
use crate::runtime::builder::{BuildError, EventLoopBuilder};
use crate::runtime::config::{Backend, LoopConfig};
use crate::runtime::proactor::{PoolProactor, Proactor};
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::pin::pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Wake, Waker};
use std::thread::{self, ThreadId};

thread_local! {
    static CURRENT_LOOP: RefCell<Option<EventLoopHandle>> = const { RefCell::new(None) };
}

/// Guard that restores the previous current loop on drop.
struct CurrentLoopGuard {
    prev: Option<EventLoopHandle>,
}

impl CurrentLoopGuard {
    fn enter(handle: EventLoopHandle) -> Self {
        let prev = CURRENT_LOOP.with(|slot| slot.borrow_mut().replace(handle));
        Self { prev }
    }
}

impl Drop for CurrentLoopGuard {
    fn drop(&mut self) {
        let prev = self.prev.take();
        CURRENT_LOOP.with(|slot| {
            *slot.borrow_mut() = prev;
        });
    }
}

struct LoopInner {
    config: LoopConfig,
    proactor: Arc<dyn Proactor>,
    blocking: BlockingPoolHandle,
    // Declared last so workers are joined after the proactor is gone.
    _pool: BlockingPool,
}

/// Owns the completion backend and the worker threads.
pub struct EventLoop {
    inner: Arc<LoopInner>,
}

impl EventLoop {
    /// Builds a loop with the default configuration.
    ///
    /// # Errors
    ///
    /// See [`EventLoopBuilder::build`].
    pub fn new() -> std::result::Result<Self, BuildError> {
        EventLoopBuilder::new().build()
    }

    /// Builds a loop from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::BackendUnavailable`] if the backend cannot run on
    /// this platform, or [`BuildError::Startup`] if OS resources fail.
    pub fn with_config(mut config: LoopConfig) -> std::result::Result<Self, BuildError> {
        config.normalize();
        let backend = config.backend.resolve();
        if !backend.is_available() {
            return Err(BuildError::BackendUnavailable { backend });
        }

        let pool = BlockingPool::new(config.worker_threads, config.thread_name_prefix.clone())
            .map_err(BuildError::startup)?;
        let proactor = make_proactor(backend, &pool, config.completion_batch)?;
        tracing::debug!(
            backend = proactor.name(),
            workers = config.worker_threads,
            batch = config.completion_batch,
            poll_timeout_ms = config.poll_timeout.as_millis() as u64,
            "event loop created"
        );

        Ok(Self {
            inner: Arc::new(LoopInner {
                blocking: pool.handle(),
                config,
                proactor,
                _pool: pool,
            }),
        })
    }

    /// A cloneable handle to this loop.
    #[must_use]
    pub fn handle(&self) -> EventLoopHandle {
        EventLoopHandle {
            inner: Arc::clone(&self.inner),
        }
    }

    /// The normalized configuration.
    #[must_use]
    pub fn config(&self) -> &LoopConfig {
        &self.inner.config
    }

    /// Name of the active completion backend.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.inner.proactor.name()
    }

    /// Runs `future` to completion on the current thread.
    ///
    /// While it runs, [`EventLoopHandle::current`] returns this loop.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        let _guard = CurrentLoopGuard::enter(self.handle());
        let proactor = &self.inner.proactor;
        let state = Arc::new(LoopWaker {
            woken: AtomicBool::new(true),
            thread: thread::current().id(),
            proactor: Arc::clone(proactor),
        });
        let waker = Waker::from(Arc::clone(&state));
        let mut cx = Context::from_waker(&waker);
        let mut future = pin!(future);

        loop {
            if state.woken.swap(false, Ordering::AcqRel) {
                if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
                    return output;
                }
                continue;
            }
            if let Err(err) = proactor.poll(Some(self.inner.config.poll_timeout)) {
                tracing::warn!(backend = proactor.name(), error = %err, "completion port poll failed");
                thread::yield_now();
            }
        }
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("config", &self.inner.config)
            .field("proactor", &self.inner.proactor)
            .finish()
    }
}

fn make_proactor(
    backend: Backend,
    pool: &BlockingPool,
    batch: usize,
) -> std::result::Result<Arc<dyn Proactor>, BuildError> {
    match backend {
        #[cfg(windows)]
        Backend::Iocp => {
            let proactor = crate::runtime::proactor::IocpProactor::new(batch)
                .map_err(BuildError::startup)?;
            Ok(Arc::new(proactor))
        }
        #[cfg(not(windows))]
        Backend::Iocp => Err(BuildError::BackendUnavailable { backend }),
        Backend::Pool | Backend::Auto => Ok(Arc::new(PoolProactor::new(pool.handle(), batch))),
    }
}

/// Waker that marks the loop runnable and interrupts a parked port wait.
struct LoopWaker {
    woken: AtomicBool,
    thread: ThreadId,
    proactor: Arc<dyn Proactor>,
}

impl Wake for LoopWaker {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        let was_woken = self.woken.swap(true, Ordering::AcqRel);
        if !was_woken && thread::current().id() != self.thread {
            if let Err(err) = self.proactor.wake() {
                tracing::warn!(error = %err, "failed to post wake packet");
            }
        }
    }
}

/// Cloneable access to a running [`EventLoop`].
#[derive(Clone)]
pub struct EventLoopHandle {
    inner: Arc<LoopInner>,
}

impl EventLoopHandle {
    /// The loop running on this thread.
    ///
    /// # Errors
    ///
    /// Returns a `NoEventLoop` error outside [`EventLoop::block_on`].
    pub fn current() -> Result<Self> {
        Self::try_current().ok_or_else(|| {
            Error::new(ErrorKind::NoEventLoop).with_message("no event loop is running on this thread")
        })
    }

    /// The loop running on this thread, if any.
    #[must_use]
    pub fn try_current() -> Option<Self> {
        CURRENT_LOOP.with(|slot| slot.borrow().clone())
    }

    /// The loop's completion backend.
    #[must_use]
    pub fn proactor(&self) -> &dyn Proactor {
        self.inner.proactor.as_ref()
    }

    /// The loop's blocking pool.
    #[must_use]
    pub fn blocking_pool(&self) -> &BlockingPoolHandle {
        &self.inner.blocking
    }

    /// The loop's configuration.
    #[must_use]
    pub fn config(&self) -> &LoopConfig {
        &self.inner.config
    }
}

impl fmt::Debug for EventLoopHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoopHandle")
            .field("backend", &self.inner.proactor.name())
            .finish_non_exhaustive()
    }
}
