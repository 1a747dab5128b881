//! Completion-port proactor abstraction.
//!
//! A proactor issues positional reads and writes against registered file
//! handles and turns completion notifications into byte counts. Unlike a
//! readiness reactor, the operation itself is handed to the backend; the
//! caller only learns about it again when the transfer has finished.
//!
//! # Architecture
//!
//! ```text
//!   AsyncFile ──► file ops ──► Proactor::submit_* ──► backend (port)
//!                                    │                     │
//!                                    ▼                     ▼
//!                              Completion  ◄── slot ◄── Proactor::poll
//! ```
//!
//! Each submission creates an [`OverlappedRequest`] that owns its buffer and
//! a [`CompletionSlot`]. The backend eventually posts a completion packet to
//! its port; [`Proactor::poll`], called by the event loop thread, drains the
//! port, stores each result in its slot and wakes the waiting task.
//!
//! # Backends
//!
//! | Platform | Backend | Module |
//! |----------|---------|--------|
//! | Windows | I/O completion port | `iocp.rs` |
//! | Any | thread-pool simulated port | `pool.rs` |
//!
//! # Cancel Safety
//!
//! Dropping a pending [`Completion`] abandons the slot. The request is still
//! owned by the backend until the OS reports it finished, so the buffer stays
//! valid; the transfer may still happen. The late completion is discarded.

pub mod overlapped;
pub mod pool;

#[cfg(target_os = "windows")]
pub mod iocp;

pub use overlapped::{OffsetWords, OpKind, OverlappedRequest};
pub use pool::PoolProactor;

#[cfg(target_os = "windows")]
pub use iocp::IocpProactor;

use crate::error::{Error, Result};
use crate::fs::FileHandle;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::fs::OpenOptions;
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::Duration;

/// Result of a finished positional transfer.
///
/// The buffer handed to the proactor is returned unchanged in length; only
/// the first `transferred` bytes are meaningful for reads.
#[derive(Debug)]
pub struct Transfer {
    /// Number of bytes actually moved.
    pub transferred: usize,
    /// The buffer that was submitted with the request.
    pub buf: Vec<u8>,
}

impl Transfer {
    /// Consumes the transfer, returning only the transferred prefix.
    #[must_use]
    pub fn into_bytes(mut self) -> Vec<u8> {
        self.buf.truncate(self.transferred);
        self.buf
    }
}

/// State of a pending operation.
#[derive(Debug)]
enum SlotState {
    /// Submitted, waiting for the completion packet.
    Pending { waker: Option<Waker> },
    /// Completed with result, not yet observed.
    Complete(Result<Transfer>),
    /// Result handed to the awaiting task.
    Taken,
    /// The awaiting task went away before completion.
    Abandoned,
}

/// Delivery point for one operation's completion.
#[derive(Debug)]
pub struct CompletionSlot {
    state: Mutex<SlotState>,
}

impl CompletionSlot {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(SlotState::Pending { waker: None }),
        }
    }

    /// Stores the result and wakes the waiter.
    ///
    /// Returns `false` if the waiter abandoned the operation; the result is
    /// dropped in that case.
    pub(crate) fn complete(&self, result: Result<Transfer>) -> bool {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, SlotState::Taken) {
            SlotState::Pending { waker } => {
                *state = SlotState::Complete(result);
                drop(state);
                if let Some(waker) = waker {
                    waker.wake();
                }
                true
            }
            SlotState::Abandoned => {
                *state = SlotState::Abandoned;
                false
            }
            other => {
                // A second completion for the same request.
                *state = other;
                false
            }
        }
    }

    fn poll_result(&self, cx: &mut Context<'_>) -> Poll<Result<Transfer>> {
        let mut state = self.state.lock();
        match std::mem::replace(&mut *state, SlotState::Taken) {
            SlotState::Complete(result) => Poll::Ready(result),
            SlotState::Pending { waker } => {
                let waker = match waker {
                    Some(w) if w.will_wake(cx.waker()) => w,
                    _ => cx.waker().clone(),
                };
                *state = SlotState::Pending { waker: Some(waker) };
                Poll::Pending
            }
            SlotState::Taken | SlotState::Abandoned => Poll::Ready(Err(Error::internal(
                "completion polled after its result was taken",
            ))),
        }
    }

    fn abandon(&self) {
        let mut state = self.state.lock();
        if matches!(*state, SlotState::Pending { .. }) {
            *state = SlotState::Abandoned;
        }
    }

    /// Returns true if a result is waiting to be observed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        matches!(*self.state.lock(), SlotState::Complete(_))
    }
}

/// Awaitable for a submitted positional read or write.
///
/// Resolves to the [`Transfer`] once the backend has reported the completion
/// and the event loop has dispatched it.
#[must_use = "completions do nothing unless awaited"]
pub struct Completion {
    kind: OpKind,
    offset: u64,
    slot: Arc<CompletionSlot>,
    finished: bool,
}

impl Completion {
    pub(crate) fn new(kind: OpKind, offset: u64, slot: Arc<CompletionSlot>) -> Self {
        Self {
            kind,
            offset,
            slot,
            finished: false,
        }
    }

    /// Completes `request` without involving the port.
    ///
    /// Used when the backend learns the outcome at submission time.
    pub(crate) fn immediate(request: OverlappedRequest, result: Result<usize>) -> Self {
        let OverlappedRequest {
            kind,
            offset,
            buf,
            slot,
            ..
        } = request;
        slot.complete(result.map(|transferred| Transfer { transferred, buf }));
        Self::new(kind, offset.decode(), slot)
    }

    /// Transfer direction of the underlying request.
    #[must_use]
    pub const fn kind(&self) -> OpKind {
        self.kind
    }

    /// Offset the request targets.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset
    }
}

impl Future for Completion {
    type Output = Result<Transfer>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let result = std::task::ready!(this.slot.poll_result(cx));
        this.finished = true;
        Poll::Ready(result)
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if !self.finished {
            self.slot.abandon();
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("kind", &self.kind)
            .field("offset", &self.offset)
            .field("finished", &self.finished)
            .finish()
    }
}

/// Set of handle ids already associated with a port.
#[derive(Debug, Default)]
pub(crate) struct Registrations {
    ids: Mutex<HashSet<u64>>,
}

impl Registrations {
    /// Records `id`; returns true the first time it is seen.
    pub(crate) fn insert(&self, id: u64) -> bool {
        self.ids.lock().insert(id)
    }

    pub(crate) fn remove(&self, id: u64) -> bool {
        self.ids.lock().remove(&id)
    }

    pub(crate) fn contains(&self, id: u64) -> bool {
        self.ids.lock().contains(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.ids.lock().len()
    }
}

/// Positional I/O backend driven by a completion port.
///
/// Implementations must be usable from the event loop thread and from
/// wakers on other threads.
pub trait Proactor: Send + Sync + fmt::Debug {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Associates `handle` with the completion port.
    ///
    /// Idempotent: registering the same handle again is a no-op.
    fn register(&self, handle: &FileHandle) -> Result<()>;

    /// Forgets a handle that is about to be closed.
    fn deregister(&self, handle: &FileHandle);

    /// Returns true if `handle` is associated with the port.
    fn is_registered(&self, handle: &FileHandle) -> bool;

    /// Adjusts open options so handles suit this backend.
    fn prepare_open(&self, _options: &mut OpenOptions) {}

    /// Issues a positional read of up to `buf.len()` bytes at `offset`.
    fn submit_read(&self, handle: &FileHandle, buf: Vec<u8>, offset: u64) -> Completion;

    /// Issues a positional write of `buf` at `offset`.
    fn submit_write(&self, handle: &FileHandle, buf: Vec<u8>, offset: u64) -> Completion;

    /// Drains completion packets, waiting up to `timeout` for the first.
    ///
    /// Returns the number of operations dispatched to their slots.
    fn poll(&self, timeout: Option<Duration>) -> Result<usize>;

    /// Unblocks a concurrent or subsequent `poll`.
    fn wake(&self) -> Result<()>;

    /// Number of submitted operations whose completion has not been dispatched.
    fn in_flight(&self) -> usize;
}

/// Maps the raw outcome of a positional transfer to completion semantics.
///
/// A read of a non-empty buffer that moves nothing is the end-of-file
/// sentinel, and a broken pipe counts as a zero-byte transfer. Other errors
/// keep their OS code.
pub(crate) fn completion_result(
    kind: OpKind,
    requested: usize,
    outcome: io::Result<usize>,
) -> Result<usize> {
    match outcome {
        Ok(0) if kind == OpKind::Read && requested > 0 => Err(Error::end_of_file()),
        Ok(n) => Ok(n),
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(0),
        Err(e) => match e.raw_os_error() {
            Some(code) => Err(Error::from_raw_os_error(code)),
            None => Err(Error::from(e)),
        },
    }
}

/// Hands a dequeued completion to its slot, logging late arrivals.
pub(crate) fn dispatch(backend: &'static str, request: OverlappedRequest, result: Result<usize>) {
    let OverlappedRequest {
        kind,
        offset,
        buf,
        handle,
        slot,
    } = request;
    tracing::trace!(
        backend,
        op = %kind,
        handle = handle.id(),
        offset = offset.decode(),
        requested = buf.len(),
        transferred = ?result.as_ref().ok(),
        "completion dispatched"
    );
    let delivered = slot.complete(result.map(|transferred| Transfer { transferred, buf }));
    if !delivered {
        tracing::warn!(
            backend,
            op = %kind,
            handle = handle.id(),
            offset = offset.decode(),
            "completion arrived for an abandoned request"
        );
    }
}
