//! Cursor-tracking async file.
//!
//! [`AsyncFile`] layers a logical cursor over the positional event-loop
//! operations. Reads and writes target the cursor and advance it by the bytes
//! actually transferred; short transfers are returned to the caller, never
//! retried.
//!
//! A file is either open or closed. Once closed, reads, writes and `fileno`
//! fail with a `Closed` error; the cursor stays readable and seekable.

use crate::error::{Error, Result};
use crate::fs::handle::{FileHandle, RawHandle};
use crate::runtime::EventLoopHandle;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Reference point for [`AsyncFile::seek`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Whence {
    /// Absolute position.
    Set,
    /// Relative to the current cursor.
    Cur,
    /// Relative to the end of the file. Never supported.
    End,
}

impl Whence {
    /// Maps the conventional numeric values (0, 1, 2).
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for any other value.
    pub fn from_raw(raw: i32) -> Result<Self> {
        match raw {
            0 => Ok(Self::Set),
            1 => Ok(Self::Cur),
            2 => Ok(Self::End),
            other => Err(Error::invalid_argument(format!("unsupported whence: {other}"))),
        }
    }

    /// The conventional numeric value.
    #[must_use]
    pub const fn as_raw(self) -> i32 {
        match self {
            Self::Set => 0,
            Self::Cur => 1,
            Self::End => 2,
        }
    }
}

/// An open file with a logical cursor.
pub struct AsyncFile {
    handle: Option<FileHandle>,
    cursor: u64,
    event_loop: EventLoopHandle,
}

impl AsyncFile {
    /// Wraps an open handle with the cursor at 0.
    #[must_use]
    pub fn new(handle: FileHandle, event_loop: EventLoopHandle) -> Self {
        Self::with_offset(handle, event_loop, 0)
    }

    /// Wraps an open handle with the cursor at `offset`.
    #[must_use]
    pub fn with_offset(handle: FileHandle, event_loop: EventLoopHandle, offset: u64) -> Self {
        Self {
            handle: Some(handle),
            cursor: offset,
            event_loop,
        }
    }

    /// The offset the next read or write will target.
    #[must_use]
    pub fn tell(&self) -> u64 {
        self.cursor
    }

    /// Moves the cursor and returns its new value.
    ///
    /// Only the cursor changes; the OS handle is not touched.
    ///
    /// # Errors
    ///
    /// `Unsupported` for [`Whence::End`]. `InvalidArgument` if the resulting
    /// position would be negative or overflow.
    pub fn seek(&mut self, offset: i64, whence: Whence) -> Result<u64> {
        let target = match whence {
            Whence::Set => u64::try_from(offset).ok(),
            Whence::Cur => self.cursor.checked_add_signed(offset),
            Whence::End => return Err(Error::unsupported("SEEK_END is not supported")),
        };
        let Some(target) = target else {
            return Err(Error::invalid_argument(format!(
                "seek by {offset} with whence {} from {} is out of range",
                whence.as_raw(),
                self.cursor
            )));
        };
        self.cursor = target;
        Ok(target)
    }

    /// [`seek`](Self::seek) with a numeric whence.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for an unknown whence, otherwise as `seek`.
    pub fn seek_raw(&mut self, offset: i64, whence: i32) -> Result<u64> {
        self.seek(offset, Whence::from_raw(whence)?)
    }

    /// Reads up to `n` bytes at the cursor and advances it by the count read.
    ///
    /// # Errors
    ///
    /// `Closed` after [`close`](Self::close); the end-of-file condition when
    /// the cursor is at or past the end; any OS error.
    pub async fn read(&mut self, n: usize) -> Result<Vec<u8>> {
        let handle = self.handle.as_ref().ok_or_else(Error::closed)?;
        let data = self.event_loop.file_read(handle, n, self.cursor).await?;
        self.cursor += data.len() as u64;
        Ok(data)
    }

    /// Writes `data` at the cursor and advances it by the count written.
    ///
    /// # Errors
    ///
    /// `Closed` after [`close`](Self::close); any OS error.
    pub async fn write(&mut self, data: &[u8]) -> Result<usize> {
        let handle = self.handle.as_ref().ok_or_else(Error::closed)?;
        let written = self.event_loop.file_write(handle, data, self.cursor).await?;
        self.cursor += written as u64;
        Ok(written)
    }

    /// Releases the handle. Closing an already closed file does nothing.
    pub fn close(&mut self) -> Result<()> {
        match self.handle.take() {
            Some(handle) => self.event_loop.file_close(handle),
            None => Ok(()),
        }
    }

    /// Returns true once the handle has been released.
    #[must_use]
    pub fn closed(&self) -> bool {
        self.handle.is_none()
    }

    /// The raw OS handle.
    ///
    /// # Errors
    ///
    /// `Closed` after [`close`](Self::close).
    pub fn fileno(&self) -> Result<RawHandle> {
        self.handle
            .as_ref()
            .map(FileHandle::as_raw)
            .ok_or_else(Error::closed)
    }

    /// Identity of the underlying handle, if still open.
    #[must_use]
    pub fn handle_id(&self) -> Option<u64> {
        self.handle.as_ref().map(FileHandle::id)
    }

    pub(crate) fn handle(&self) -> Result<&FileHandle> {
        self.handle.as_ref().ok_or_else(Error::closed)
    }

    /// Runs `body` with this file, then closes it on every exit path.
    ///
    /// The body's error takes precedence over a close error.
    ///
    /// ```ignore
    /// let mut file = portio::open(path).await?;
    /// let head = file
    ///     .scoped(|f| Box::pin(async move { f.read(16).await }))
    ///     .await?;
    /// assert!(file.closed());
    /// ```
    ///
    /// # Errors
    ///
    /// Whatever `body` returns, or the close error if `body` succeeded.
    pub async fn scoped<T, F>(&mut self, body: F) -> Result<T>
    where
        F: for<'a> FnOnce(&'a mut AsyncFile) -> Pin<Box<dyn Future<Output = Result<T>> + 'a>>,
    {
        let outcome = body(&mut *self).await;
        let closed = self.close();
        match (outcome, closed) {
            (Err(err), _) => Err(err),
            (Ok(_), Err(err)) => Err(err),
            (Ok(value), Ok(())) => Ok(value),
        }
    }
}

impl Drop for AsyncFile {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            tracing::debug!(handle = handle.id(), "async file dropped without close");
            let _ = self.event_loop.file_close(handle);
        }
    }
}

impl fmt::Debug for AsyncFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncFile")
            .field("handle", &self.handle)
            .field("cursor", &self.cursor)
            .field("closed", &self.closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_utils::{run_test, temp_file_with};

    fn init_test(name: &str) {
        crate::test_utils::init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn whence_from_raw() {
        init_test("whence_from_raw");
        assert_eq!(Whence::from_raw(0).unwrap(), Whence::Set);
        assert_eq!(Whence::from_raw(1).unwrap(), Whence::Cur);
        assert_eq!(Whence::from_raw(2).unwrap(), Whence::End);
        let err = Whence::from_raw(3).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        crate::test_complete!("whence_from_raw");
    }

    #[test]
    fn seek_moves_cursor_only() {
        init_test("seek_moves_cursor_only");
        let (_dir, path) = temp_file_with(b"abcdef");
        run_test(|event_loop| async move {
            let handle = event_loop.file_open(&path, "rb").await.unwrap();
            let mut file = AsyncFile::new(handle, event_loop);
            assert_eq!(file.tell(), 0);
            assert_eq!(file.seek(4, Whence::Set).unwrap(), 4);
            assert_eq!(file.seek(-3, Whence::Cur).unwrap(), 1);
            assert_eq!(file.seek_raw(2, 1).unwrap(), 3);
            let data = file.read(10).await.unwrap();
            assert_eq!(data, b"def");
            crate::assert_with_log!(file.tell() == 6, "cursor", 6u64, file.tell());
        });
        crate::test_complete!("seek_moves_cursor_only");
    }

    #[test]
    fn seek_rejections_leave_cursor() {
        init_test("seek_rejections_leave_cursor");
        let (_dir, path) = temp_file_with(b"abc");
        run_test(|event_loop| async move {
            let handle = event_loop.file_open(&path, "rb").await.unwrap();
            let mut file = AsyncFile::with_offset(handle, event_loop, 2);

            let err = file.seek(0, Whence::End).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Unsupported);
            assert_eq!(err.message(), Some("SEEK_END is not supported"));

            assert_eq!(file.seek_raw(0, 7).unwrap_err().kind(), ErrorKind::InvalidArgument);
            assert_eq!(file.seek(-3, Whence::Cur).unwrap_err().kind(), ErrorKind::InvalidArgument);
            assert_eq!(file.seek(-1, Whence::Set).unwrap_err().kind(), ErrorKind::InvalidArgument);
            crate::assert_with_log!(file.tell() == 2, "cursor unchanged", 2u64, file.tell());
        });
        crate::test_complete!("seek_rejections_leave_cursor");
    }

    #[test]
    fn io_after_close_fails_fast() {
        init_test("io_after_close_fails_fast");
        let (_dir, path) = temp_file_with(b"abc");
        run_test(|event_loop| async move {
            let handle = event_loop.file_open(&path, "r+b").await.unwrap();
            let mut file = AsyncFile::new(handle, event_loop);
            assert!(!file.closed());
            assert!(file.fileno().is_ok());
            assert!(file.handle_id().is_some());

            file.close().unwrap();
            assert!(file.closed());
            assert!(file.read(1).await.unwrap_err().is_closed());
            assert!(file.write(b"x").await.unwrap_err().is_closed());
            assert!(file.fileno().unwrap_err().is_closed());
            assert!(file.handle_id().is_none());
            file.close().unwrap();

            assert_eq!(file.seek(1, Whence::Set).unwrap(), 1);
        });
        crate::test_complete!("io_after_close_fails_fast");
    }

    #[test]
    fn write_advances_by_bytes_written() {
        init_test("write_advances_by_bytes_written");
        let (_dir, path) = temp_file_with(b"");
        let check = path.clone();
        run_test(|event_loop| async move {
            let handle = event_loop.file_open(&path, "r+b").await.unwrap();
            let mut file = AsyncFile::new(handle, event_loop);
            assert_eq!(file.write(b"hello").await.unwrap(), 5);
            assert_eq!(file.write(b" you").await.unwrap(), 4);
            crate::assert_with_log!(file.tell() == 9, "cursor", 9u64, file.tell());
            file.close().unwrap();
        });
        assert_eq!(std::fs::read(check).unwrap(), b"hello you");
        crate::test_complete!("write_advances_by_bytes_written");
    }

    #[test]
    fn scoped_closes_on_success_and_error() {
        init_test("scoped_closes_on_success_and_error");
        let (_dir, path) = temp_file_with(b"abc");
        run_test(|event_loop| async move {
            let handle = event_loop.file_open(&path, "rb").await.unwrap();
            let mut file = AsyncFile::new(handle, event_loop.clone());
            let head = file
                .scoped(|f| Box::pin(async move { f.read(2).await }))
                .await
                .unwrap();
            assert_eq!(head, b"ab");
            assert!(file.closed());

            let handle = event_loop.file_open(&path, "rb").await.unwrap();
            let mut file = AsyncFile::new(handle, event_loop);
            let err = file
                .scoped(|f| {
                    Box::pin(async move {
                        f.seek(0, Whence::End)?;
                        Ok::<(), Error>(())
                    })
                })
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Unsupported);
            assert!(file.closed());
        });
        crate::test_complete!("scoped_closes_on_success_and_error");
    }

    #[test]
    fn drop_releases_handle() {
        init_test("drop_releases_handle");
        let (_dir, path) = temp_file_with(b"abc");
        run_test(|event_loop| async move {
            let handle = event_loop.file_open(&path, "rb").await.unwrap();
            let witness = handle.keep_alive();
            drop(AsyncFile::new(handle, event_loop.clone()));
            assert!(!event_loop.proactor().is_registered(&witness));
            assert_eq!(witness.ref_count(), 1);
        });
        crate::test_complete!("drop_releases_handle");
    }
}
