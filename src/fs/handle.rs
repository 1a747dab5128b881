//! Owned OS file handles.
//!
//! A [`FileHandle`] wraps one open `std::fs::File` together with a
//! process-unique id. The id is what proactors use to make registration
//! idempotent, and what log events carry to correlate a transfer with the
//! file it targets.
//!
//! The handle is owned by exactly one `AsyncFile`. In-flight requests hold an
//! internal keep-alive reference so the OS handle cannot be closed underneath
//! a transfer the kernel still owns; the handle is released when the owner
//! closes it *and* the last outstanding completion has been dispatched.

use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Global counter for generating unique handle IDs.
static HANDLE_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Generates a new unique handle ID.
///
/// Each call returns a monotonically increasing value, starting from 1.
#[must_use]
pub fn next_handle_id() -> u64 {
    HANDLE_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Platform handle identifier exposed by `fileno()`.
#[cfg(unix)]
pub type RawHandle = std::os::unix::io::RawFd;

/// Platform handle identifier exposed by `fileno()`.
#[cfg(windows)]
pub type RawHandle = std::os::windows::io::RawHandle;

struct HandleInner {
    id: u64,
    file: File,
    path: Option<PathBuf>,
}

/// An open OS file handle.
pub struct FileHandle {
    inner: Arc<HandleInner>,
}

impl FileHandle {
    /// Wraps an already-open file that was opened from `path`.
    #[must_use]
    pub fn new(file: File, path: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id: next_handle_id(),
                file,
                path: Some(path.into()),
            }),
        }
    }

    /// Wraps an already-open file with no known path.
    ///
    /// On Windows the file must have been opened with `FILE_FLAG_OVERLAPPED`
    /// to be used with the native completion port.
    #[must_use]
    pub fn from_std(file: File) -> Self {
        Self {
            inner: Arc::new(HandleInner {
                id: next_handle_id(),
                file,
                path: None,
            }),
        }
    }

    /// Process-unique identity of this handle.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// The underlying std file.
    #[must_use]
    pub fn file(&self) -> &File {
        &self.inner.file
    }

    /// The path this handle was opened from, if known.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.inner.path.as_deref()
    }

    /// The raw OS handle.
    #[cfg(unix)]
    #[must_use]
    pub fn as_raw(&self) -> RawHandle {
        use std::os::unix::io::AsRawFd;
        self.inner.file.as_raw_fd()
    }

    /// The raw OS handle.
    #[cfg(windows)]
    #[must_use]
    pub fn as_raw(&self) -> RawHandle {
        use std::os::windows::io::AsRawHandle;
        self.inner.file.as_raw_handle()
    }

    /// Another reference to the same OS handle, for in-flight requests.
    pub(crate) fn keep_alive(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Number of live references (owner plus in-flight requests).
    pub(crate) fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("id", &self.inner.id)
            .field("path", &self.inner.path)
            .finish()
    }
}
