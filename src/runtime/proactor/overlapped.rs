//! Per-operation overlapped request descriptors.
//!
//! Native completion APIs take the target byte offset as two 32-bit words
//! (`Offset` / `OffsetHigh`) inside the request structure. [`OffsetWords`]
//! is the pure encode/decode step at that boundary; it is used by every
//! backend so that the portable pool exercises the same path as the native
//! port.
//!
//! A request is created per read or write, travels to the backend together
//! with its buffer, and is destroyed once its completion has been observed.
//! It is never shared across operations.

use crate::fs::FileHandle;
use crate::runtime::proactor::CompletionSlot;
use std::fmt;
use std::sync::Arc;

/// A 64-bit file offset split into the two 32-bit halves of the native ABI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OffsetWords {
    /// Low 32 bits (`offset & 0xFFFF_FFFF`).
    pub low: u32,
    /// High 32 bits (`(offset >> 32) & 0xFFFF_FFFF`).
    pub high: u32,
}

impl OffsetWords {
    /// Splits a 64-bit offset into its low and high words.
    #[must_use]
    pub const fn encode(offset: u64) -> Self {
        Self {
            low: (offset & 0xFFFF_FFFF) as u32,
            high: ((offset >> 32) & 0xFFFF_FFFF) as u32,
        }
    }

    /// Reassembles the 64-bit offset.
    #[must_use]
    pub const fn decode(self) -> u64 {
        ((self.high as u64) << 32) | self.low as u64
    }
}

impl From<u64> for OffsetWords {
    fn from(offset: u64) -> Self {
        Self::encode(offset)
    }
}

impl From<OffsetWords> for u64 {
    fn from(words: OffsetWords) -> Self {
        words.decode()
    }
}

/// Direction of a positional transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpKind {
    /// Read from the file into the buffer.
    Read,
    /// Write the buffer into the file.
    Write,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("read"),
            Self::Write => f.write_str("write"),
        }
    }
}

/// One in-flight positional read or write.
///
/// Owns everything the OS may touch until the completion is observed: the
/// buffer, a keep-alive reference to the handle, and the slot the result is
/// delivered into.
pub struct OverlappedRequest {
    /// Transfer direction.
    pub kind: OpKind,
    /// Target offset in native two-word form.
    pub offset: OffsetWords,
    /// Read destination or write source.
    pub buf: Vec<u8>,
    /// Keeps the OS handle open while the transfer is outstanding.
    pub handle: FileHandle,
    /// Where the completion is delivered.
    pub slot: Arc<CompletionSlot>,
}

impl OverlappedRequest {
    /// Builds a request for `kind` at `offset`.
    #[must_use]
    pub fn new(kind: OpKind, handle: &FileHandle, buf: Vec<u8>, offset: u64) -> Self {
        Self {
            kind,
            offset: OffsetWords::encode(offset),
            buf,
            handle: handle.keep_alive(),
            slot: Arc::new(CompletionSlot::new()),
        }
    }

    /// The logical 64-bit offset of this request.
    #[must_use]
    pub const fn offset(&self) -> u64 {
        self.offset.decode()
    }

    /// Number of bytes requested.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

impl fmt::Debug for OverlappedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OverlappedRequest")
            .field("kind", &self.kind)
            .field("offset", &self.offset())
            .field("len", &self.buf.len())
            .field("handle", &self.handle.id())
            .finish_non_exhaustive()
    }
}
