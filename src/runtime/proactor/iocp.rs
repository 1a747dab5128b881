//! Native I/O completion port backend.
//!
//! Each transfer is issued with `ReadFile`/`WriteFile` against an
//! `OVERLAPPED` block whose `Offset`/`OffsetHigh` carry the target position.
//! The block is the first field of a heap-allocated packet that also owns the
//! request, so the pointer the kernel hands back from
//! `GetQueuedCompletionStatusEx` is turned straight back into the packet.
//!
//! A broken pipe is reported as a zero-byte transfer and a zero-byte read
//! of a non-empty buffer as end of file, the same as the pool backend.
//!
//! # Safety
//!
//! A packet is leaked into the kernel with `Box::into_raw` when the call is
//! accepted (success or `ERROR_IO_PENDING`) and reclaimed exactly once: when
//! its completion entry is dequeued. Calls that fail synchronously never post
//! an entry, so their packet is reclaimed on the spot.

#![allow(unsafe_code)]

use super::{
    completion_result, dispatch, Completion, OpKind, OverlappedRequest, Proactor, Registrations,
};
use crate::error::{Error, Result};
use crate::fs::FileHandle;
use std::fmt;
use std::fs::OpenOptions;
use std::io;
use std::os::windows::fs::OpenOptionsExt;
use std::os::windows::io::{AsRawHandle, FromRawHandle, OwnedHandle};
use std::ptr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use windows_sys::Win32::Foundation::{
    GetLastError, ERROR_IO_PENDING, FALSE, HANDLE, INVALID_HANDLE_VALUE,
    WAIT_TIMEOUT,
};
use windows_sys::Win32::Storage::FileSystem::{ReadFile, WriteFile, FILE_FLAG_OVERLAPPED};
use windows_sys::Win32::System::Threading::INFINITE;
use windows_sys::Win32::System::IO::{
    CreateIoCompletionPort, GetOverlappedResult, GetQueuedCompletionStatusEx,
    PostQueuedCompletionStatus, OVERLAPPED, OVERLAPPED_ENTRY,
};

const BACKEND: &str = "iocp";

/// Heap block handed to the kernel for one transfer.
#[repr(C)]
struct OverlappedPacket {
    // Must stay first: the kernel returns a pointer to this field.
    overlapped: OVERLAPPED,
    request: OverlappedRequest,
}

impl OverlappedPacket {
    fn new(request: OverlappedRequest) -> Box<Self> {
        // SAFETY: OVERLAPPED is a plain C struct; all-zero is its initial state.
        let mut overlapped: OVERLAPPED = unsafe { std::mem::zeroed() };
        overlapped.Anonymous.Anonymous.Offset = request.offset.low;
        overlapped.Anonymous.Anonymous.OffsetHigh = request.offset.high;
        Box::new(Self {
            overlapped,
            request,
        })
    }
}

/// Proactor backed by a Windows I/O completion port.
pub struct IocpProactor {
    port: OwnedHandle,
    registrations: Registrations,
    in_flight: AtomicUsize,
    batch: usize,
}

impl IocpProactor {
    /// Creates a completion port that dequeues at most `batch` entries per poll.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the port cannot be created.
    pub fn new(batch: usize) -> Result<Self> {
        // SAFETY: creating a fresh port; no existing handles are involved.
        let raw = unsafe { CreateIoCompletionPort(INVALID_HANDLE_VALUE, ptr::null_mut(), 0, 1) };
        if raw.is_null() {
            return Err(Error::from(io::Error::last_os_error()));
        }
        // SAFETY: `raw` is a valid handle we exclusively own.
        let port = unsafe { OwnedHandle::from_raw_handle(raw) };
        tracing::debug!(backend = BACKEND, batch, "completion port created");
        Ok(Self {
            port,
            registrations: Registrations::default(),
            in_flight: AtomicUsize::new(0),
            batch: batch.max(1),
        })
    }

    fn port(&self) -> HANDLE {
        self.port.as_raw_handle()
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

        let slot = Arc::clone(&request.slot);
        let mut packet = OverlappedPacket::new(request);
        let len = u32::try_from(packet.request.buf.len()).unwrap_or(u32::MAX);
        let buf_ptr = packet.request.buf.as_mut_ptr();
        let raw_file: HANDLE = handle.as_raw();
        let packet = Box::into_raw(packet);

        // Counted before the call so a concurrent poll never reaps it first.
        self.in_flight.fetch_add(1, Ordering::AcqRel);
        // SAFETY: the buffer and OVERLAPPED live in the leaked packet, which
        // outlives the call and is reclaimed only after its completion entry
        // is dequeued or the call fails synchronously.
        let ok = unsafe {
            let overlapped = ptr::addr_of_mut!((*packet).overlapped);
            match kind {
                OpKind::Read => ReadFile(raw_file, buf_ptr, len, ptr::null_mut(), overlapped),
                OpKind::Write => WriteFile(raw_file, buf_ptr, len, ptr::null_mut(), overlapped),
            }
        };
        if ok == FALSE {
            // SAFETY: reading the calling thread's last-error value.
            let code = unsafe { GetLastError() };
            if code != ERROR_IO_PENDING {
                self.in_flight.fetch_sub(1, Ordering::AcqRel);
                // SAFETY: no completion entry will be posted for this packet.
                let packet = unsafe { Box::from_raw(packet) };
                let result = completion_result(
                    kind,
                    packet.request.buf.len(),
                    Err(io::Error::from_raw_os_error(code as i32)),
                );
                tracing::trace!(
                    backend = BACKEND,
                    op = %kind,
                    code,
                    "transfer completed synchronously"
                );
                return Completion::immediate(packet.request, result);
            }
        }
        Completion::new(kind, offset, slot)
    }

    fn reap(&self, entry: &OVERLAPPED_ENTRY) {
        // SAFETY: every non-null entry pointer was produced by `submit` via
        // `Box::into_raw` and is dequeued exactly once.
        let packet = unsafe { Box::from_raw(entry.lpOverlapped.cast::<OverlappedPacket>()) };
        self.in_flight.fetch_sub(1, Ordering::AcqRel);

        let mut transferred = 0u32;
        // SAFETY: the packet's OVERLAPPED finished; querying it does not block.
        let ok = unsafe {
            GetOverlappedResult(
                packet.request.handle.as_raw(),
                &packet.overlapped,
                &mut transferred,
                FALSE,
            )
        };
        let outcome = if ok == FALSE {
            Err(io::Error::last_os_error())
        } else {
            Ok(transferred as usize)
        };
        let result = completion_result(packet.request.kind, packet.request.buf.len(), outcome);
        let OverlappedPacket { request, .. } = *packet;
        dispatch(BACKEND, request, result);
    }
}

impl Proactor for IocpProactor {
    fn name(&self) -> &'static str {
        BACKEND
    }

    fn register(&self, handle: &FileHandle) -> Result<()> {
        if self.registrations.contains(handle.id()) {
            return Ok(());
        }
        // SAFETY: both handles are valid; the key is the handle id.
        let raw = unsafe {
            CreateIoCompletionPort(handle.as_raw(), self.port(), handle.id() as usize, 0)
        };
        if raw.is_null() {
            return Err(Error::from(io::Error::last_os_error()));
        }
        self.registrations.insert(handle.id());
        tracing::debug!(backend = BACKEND, handle = handle.id(), "handle registered");
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

    fn prepare_open(&self, options: &mut OpenOptions) {
        options.custom_flags(FILE_FLAG_OVERLAPPED);
    }

    fn submit_read(&self, handle: &FileHandle, buf: Vec<u8>, offset: u64) -> Completion {
        self.submit(OpKind::Read, handle, buf, offset)
    }

    fn submit_write(&self, handle: &FileHandle, buf: Vec<u8>, offset: u64) -> Completion {
        self.submit(OpKind::Write, handle, buf, offset)
    }

    fn poll(&self, timeout: Option<Duration>) -> Result<usize> {
        let millis = timeout.map_or(INFINITE, |t| {
            u32::try_from(t.as_millis()).unwrap_or(INFINITE - 1)
        });
        // SAFETY: OVERLAPPED_ENTRY is plain data; zeroed entries are valid.
        let mut entries: Vec<OVERLAPPED_ENTRY> =
            vec![unsafe { std::mem::zeroed() }; self.batch];
        let mut removed = 0u32;
        // SAFETY: `entries` has room for `batch` entries.
        let ok = unsafe {
            GetQueuedCompletionStatusEx(
                self.port(),
                entries.as_mut_ptr(),
                entries.len() as u32,
                &mut removed,
                millis,
                FALSE,
            )
        };
        if ok == FALSE {
            // SAFETY: reading the calling thread's last-error value.
            let code = unsafe { GetLastError() };
            if code == WAIT_TIMEOUT {
                return Ok(0);
            }
            return Err(Error::from_raw_os_error(code as i32));
        }

        let mut dispatched = 0;
        for entry in &entries[..removed as usize] {
            if entry.lpOverlapped.is_null() {
                // Wake packet.
                continue;
            }
            self.reap(entry);
            dispatched += 1;
        }
        Ok(dispatched)
    }

    fn wake(&self) -> Result<()> {
        // SAFETY: posting a packet with a null OVERLAPPED to our own port.
        let ok = unsafe { PostQueuedCompletionStatus(self.port(), 0, 0, ptr::null()) };
        if ok == FALSE {
            return Err(Error::from(io::Error::last_os_error()));
        }
        Ok(())
    }

    fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }
}

impl Drop for IocpProactor {
    fn drop(&mut self) {
        let outstanding = self.in_flight();
        if outstanding > 0 {
            // Their packets stay leaked: the kernel may still write into them.
            tracing::warn!(
                backend = BACKEND,
                outstanding,
                "completion port dropped with transfers in flight"
            );
        }
    }
}

impl fmt::Debug for IocpProactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IocpProactor")
            .field("registered", &self.registrations.len())
            .field("in_flight", &self.in_flight())
            .field("batch", &self.batch)
            .finish_non_exhaustive()
    }
}
