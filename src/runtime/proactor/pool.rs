//! Thread-pool backed completion port.
//!
//! Positional transfers are executed synchronously on blocking pool workers
//! (`pread`/`pwrite` on Unix, `seek_read`/`seek_write` on Windows) and each
//! outcome is posted as a packet to an in-process port. The event loop thread
//! drains the port in [`Proactor::poll`] exactly like it drains a native
//! completion port, so callers observe the same completion semantics:
//!
//! - A read of a non-empty buffer that transfers nothing is reported as the
//!   end-of-file condition.
//! - A broken pipe is reported as a zero-byte transfer.
//!
//! Registration has no OS side; it only records the handle identity.

use super::{
    completion_result, dispatch, Completion, OpKind, OverlappedRequest, Proactor, Registrations,
};
use crate::error::Result;
use crate::fs::FileHandle;
use crate::runtime::blocking_pool::BlockingPoolHandle;
use crossbeam_queue::SegQueue;
use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::fs::File;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

const BACKEND: &str = "pool";

enum Packet {
    Done {
        request: OverlappedRequest,
        result: Result<usize>,
    },
    Wake,
}

/// In-process completion port.
struct CompletionPort {
    queue: SegQueue<Packet>,
    lock: Mutex<()>,
    ready: Condvar,
}

impl CompletionPort {
    fn new() -> Self {
        Self {
            queue: SegQueue::new(),
            lock: Mutex::new(()),
            ready: Condvar::new(),
        }
    }

    fn post(&self, packet: Packet) {
        self.queue.push(packet);
        let _guard = self.lock.lock();
        self.ready.notify_all();
    }

    /// Blocks until a packet is queued or `timeout` elapses.
    fn wait(&self, timeout: Option<Duration>) {
        if !self.queue.is_empty() {
            return;
        }
        let mut guard = self.lock.lock();
        match timeout {
            None => {
                while self.queue.is_empty() {
                    self.ready.wait(&mut guard);
                }
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while self.queue.is_empty() {
                    if self.ready.wait_until(&mut guard, deadline).timed_out() {
                        break;
                    }
                }
            }
        }
    }
}

/// Portable proactor that simulates a completion port with worker threads.
pub struct PoolProactor {
    pool: BlockingPoolHandle,
    port: Arc<CompletionPort>,
    registrations: Registrations,
    in_flight: AtomicUsize,
    batch: usize,
}

impl PoolProactor {
    /// Creates a proactor that executes transfers on `pool`, dispatching at
    /// most `batch` completions per poll.
    #[must_use]
    pub fn new(pool: BlockingPoolHandle, batch: usize) -> Self {
        Self {
            pool,
            port: Arc::new(CompletionPort::new()),
            registrations: Registrations::default(),
            in_flight: AtomicUsize::new(0),
            batch: batch.max(1),
        }
    }

    fn submit(&self, kind: OpKind, handle: &FileHandle, buf: Vec<u8>, offset: u64) -> Completion {
        let request = OverlappedRequest::new(kind, handle, buf, offset);
        if let Err(err) = self.register(handle) {
            return Completion::immediate(request, Err(err));
        }
        tracing::trace!(
            backend = BACKEND,
            op = %kind,
            handle = handle.id(),
            offset,
            len = request.len(),
            "submitting positional transfer"
        );

        let completion = Completion::new(kind, offset, Arc::clone(&request.slot));
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        let port = Arc::clone(&self.port);
        self.pool.spawn(move || {
            let mut request = request;
            let result = execute(&mut request);
            port.post(Packet::Done { request, result });
        });
        completion
    }
}

/// Runs one transfer synchronously and maps the outcome to completion-port
/// semantics.
fn execute(request: &mut OverlappedRequest) -> Result<usize> {
    let offset = request.offset.decode();
    let file = request.handle.file();
    let outcome = loop {
        let attempt = match request.kind {
            OpKind::Read => read_at(file, &mut request.buf, offset),
            OpKind::Write => write_at(file, &request.buf, offset),
        };
        match attempt {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => break other,
        }
    };
    completion_result(request.kind, request.buf.len(), outcome)
}

#[cfg(unix)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    std::os::unix::fs::FileExt::read_at(file, buf, offset)
}

#[cfg(unix)]
fn write_at(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
    std::os::unix::fs::FileExt::write_at(file, buf, offset)
}

#[cfg(windows)]
fn read_at(file: &File, buf: &mut [u8], offset: u64) -> io::Result<usize> {
    std::os::windows::fs::FileExt::seek_read(file, buf, offset)
}

#[cfg(windows)]
fn write_at(file: &File, buf: &[u8], offset: u64) -> io::Result<usize> {
    std::os::windows::fs::FileExt::seek_write(file, buf, offset)
}

#[cfg(not(any(unix, windows)))]
fn read_at(_file: &File, _buf: &mut [u8], _offset: u64) -> io::Result<usize> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "positional reads are not supported on this platform",
    ))
}

#[cfg(not(any(unix, windows)))]
fn write_at(_file: &File, _buf: &[u8], _offset: u64) -> io::Result<usize> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "positional writes are not supported on this platform",
    ))
}

impl Proactor for PoolProactor {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn register(&self, handle: &FileHandle) -> Result<()> {
        if self.registrations.insert(handle.id()) {
            tracing::debug!(backend = BACKEND, handle = handle.id(), "handle registered");
        }
        Ok(())
    }

    fn deregister(&self, handle: &FileHandle) {
        if self.registrations.remove(handle.id()) {
            tracing::debug!(backend = BACKEND, handle = handle.id(), "handle deregistered");
        }
    }

    fn is_registered(&self, handle: &FileHandle) -> bool {
        self.registrations.contains(handle.id())
    }

    fn submit_read(&self, handle: &FileHandle, buf: Vec<u8>, offset: u64) -> Completion {
        self.submit(OpKind::Read, handle, buf, offset)
    }

    fn submit_write(&self, handle: &FileHandle, buf: Vec<u8>, offset: u64) -> Completion {
        self.submit(OpKind::Write, handle, buf, offset)
    }

    fn poll(&self, timeout: Option<Duration>) -> Result<usize> {
        self.port.wait(timeout);
        let mut dispatched = 0;
        for _ in 0..self.batch {
            match self.port.queue.pop() {
                Some(Packet::Done { request, result }) => {
                    self.in_flight.fetch_sub(1, Ordering::AcqRel);
                    dispatch(BACKEND, request, result);
                    dispatched += 1;
                }
                Some(Packet::Wake) => {}
                None => break,
            }
        }
        Ok(dispatched)
    }

    fn wake(&self) -> Result<()> {
        self.port.post(Packet::Wake);
        Ok(())
    }

    fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }
}

impl fmt::Debug for PoolProactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolProactor")
            .field("registered", &self.registrations.len())
            .field("in_flight", &self.in_flight())
            .field("batch", &self.batch)
            .finish_non_exhaustive()
    }
}
