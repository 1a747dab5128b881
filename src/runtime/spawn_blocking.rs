//! Async wrapper for blocking pool operations.
//!
//! [`spawn_blocking`] runs a closure on a [`BlockingPoolHandle`] and returns a
//! future that resolves to its value. The worker wakes the awaiting task when
//! the closure returns, so the event loop can stay parked on its completion
//! port in the meantime.
//!
//! # Cancellation Safety
//!
//! When the returned future is dropped (cancelled), the blocking operation
//! continues to run to completion on the pool thread, but its result is
//! discarded.

use crate::runtime::blocking_pool::BlockingPoolHandle;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::thread;

struct Shared<T> {
    result: Option<thread::Result<T>>,
    waker: Option<Waker>,
}

/// Future returned by [`spawn_blocking`].
#[must_use = "futures do nothing unless awaited"]
pub struct BlockingTask<T> {
    shared: Arc<Mutex<Shared<T>>>,
}

impl<T> fmt::Debug for BlockingTask<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockingTask")
            .field("done", &self.shared.lock().result.is_some())
            .finish()
    }
}

/// Spawns a blocking operation and returns a future that resolves to its value.
///
/// # Panics
///
/// If the blocking operation panics, the panic is captured and re-raised when
/// the future is polled.
pub fn spawn_blocking<F, T>(pool: &BlockingPoolHandle, f: F) -> BlockingTask<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let shared = Arc::new(Mutex::new(Shared {
        result: None,
        waker: None,
    }));
    let worker_shared = Arc::clone(&shared);
    pool.spawn(move || {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(f));
        let waker = {
            let mut state = worker_shared.lock();
            state.result = Some(result);
            state.waker.take()
        };
        if let Some(waker) = waker {
            waker.wake();
        }
    });
    BlockingTask { shared }
}

/// Spawns a blocking I/O operation.
///
/// Convenience wrapper around [`spawn_blocking`] for I/O operations.
pub fn spawn_blocking_io<F, T>(pool: &BlockingPoolHandle, f: F) -> BlockingTask<std::io::Result<T>>
where
    F: FnOnce() -> std::io::Result<T> + Send + 'static,
    T: Send + 'static,
{
    spawn_blocking(pool, f)
}

impl<T> Future for BlockingTask<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        let mut state = self.shared.lock();
        match state.result.take() {
            Some(Ok(value)) => Poll::Ready(value),
            Some(Err(payload)) => {
                drop(state);
                std::panic::resume_unwind(payload)
            }
            None => {
                match &state.waker {
                    Some(w) if w.will_wake(cx.waker()) => {}
                    _ => state.waker = Some(cx.waker().clone()),
                }
                Poll::Pending
            }
        }
    }
}
