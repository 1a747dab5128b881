//! Event-loop file operations.
//!
//! Thin async operations on [`EventLoopHandle`] that pair a [`FileHandle`]
//! with the loop's completion backend. Every read and write is positional:
//! the caller supplies the offset and nothing here tracks a cursor.

use crate::error::{Error, Result, ResultExt};
use crate::fs::{FileHandle, OpenMode};
use crate::runtime::event_loop::EventLoopHandle;
use crate::runtime::proactor::Completion;
use crate::runtime::spawn_blocking::spawn_blocking_io;
use futures_lite::Stream;
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::task::{Context, Poll};

impl EventLoopHandle {
    /// Opens an existing file for positional I/O.
    ///
    /// `mode` must be `"rb"` or `"r+b"`. The file is never created or
    /// truncated. The returned handle is already registered with the
    /// completion port.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` for any other mode string; the OS error if the open
    /// or registration fails.
    pub async fn file_open(&self, path: impl AsRef<Path>, mode: &str) -> Result<FileHandle> {
        let mode = OpenMode::parse(mode)?;
        let path = path.as_ref().to_path_buf();
        let mut options = mode.open_options();
        self.proactor().prepare_open(&mut options);

        let open_path = path.clone();
        let file = spawn_blocking_io(self.blocking_pool(), move || options.open(&open_path))
            .await
            .with_context(|| format!("failed to open {}", path.display()))?;

        let handle = FileHandle::new(file, &path);
        self.proactor().register(&handle)?;
        tracing::debug!(
            handle = handle.id(),
            path = %path.display(),
            mode = %mode,
            "file opened"
        );
        Ok(handle)
    }

    /// Releases `handle`.
    ///
    /// The OS handle is closed once transfers still in flight on it have
    /// completed.
    pub fn file_close(&self, handle: FileHandle) -> Result<()> {
        self.proactor().deregister(&handle);
        tracing::debug!(handle = handle.id(), "file closed");
        drop(handle);
        Ok(())
    }

    /// Writes `data` at `offset`, returning the number of bytes written.
    ///
    /// A short write is returned as is.
    ///
    /// # Errors
    ///
    /// The OS error reported by the completion.
    pub async fn file_write(&self, handle: &FileHandle, data: &[u8], offset: u64) -> Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        let transfer = self
            .proactor()
            .submit_write(handle, data.to_vec(), offset)
            .await?;
        Ok(transfer.transferred)
    }

    /// Reads up to `n` bytes at `offset`.
    ///
    /// Only the bytes actually transferred are returned.
    ///
    /// # Errors
    ///
    /// The OS error reported by the completion, including the end-of-file
    /// condition when `offset` is at or past the end.
    pub async fn file_read(&self, handle: &FileHandle, n: usize, offset: u64) -> Result<Vec<u8>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let transfer = self
            .proactor()
            .submit_read(handle, vec![0; n], offset)
            .await?;
        Ok(transfer.into_bytes())
    }

    /// Streams the whole file from offset 0 in chunks of `chunk_size`.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `chunk_size` is zero.
    pub fn file_readall<'a>(&self, handle: &'a FileHandle, chunk_size: usize) -> Result<ReadAll<'a>> {
        if chunk_size == 0 {
            return Err(Error::invalid_argument("chunk size must be positive"));
        }
        Ok(ReadAll {
            event_loop: self.clone(),
            handle,
            chunk_size,
            offset: 0,
            pending: None,
            done: false,
        })
    }
}

/// Forward-only stream of chunks returned by [`EventLoopHandle::file_readall`].
///
/// Each step reads `chunk_size` bytes at the running offset, which advances by
/// the bytes actually transferred. The stream ends quietly at end of file; any
/// other error is yielded once and then the stream ends.
#[must_use = "streams do nothing unless polled"]
pub struct ReadAll<'a> {
    event_loop: EventLoopHandle,
    handle: &'a FileHandle,
    chunk_size: usize,
    offset: u64,
    pending: Option<Completion>,
    done: bool,
}

impl ReadAll<'_> {
    /// Offset the next chunk will be read from.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Returns true once the stream has ended.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.done
    }

    fn finish(&mut self, reason: &'static str) {
        self.done = true;
        self.pending = None;
        tracing::debug!(
            handle = self.handle.id(),
            offset = self.offset,
            reason,
            "readall stream finished"
        );
    }
}

impl Stream for ReadAll<'_> {
    type Item = Result<Vec<u8>>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }
        if this.pending.is_none() {
            let completion = this.event_loop.proactor().submit_read(
                this.handle,
                vec![0; this.chunk_size],
                this.offset,
            );
            this.pending = Some(completion);
        }
        let Some(completion) = this.pending.as_mut() else {
            return Poll::Ready(None);
        };
        let result = std::task::ready!(Pin::new(completion).poll(cx));
        this.pending = None;

        match result {
            Ok(transfer) if transfer.transferred == 0 => {
                this.finish("empty transfer");
                Poll::Ready(None)
            }
            Ok(transfer) => {
                this.offset += transfer.transferred as u64;
                Poll::Ready(Some(Ok(transfer.into_bytes())))
            }
            Err(err) if err.is_end_of_file() => {
                this.finish("end of file");
                Poll::Ready(None)
            }
            Err(err) => {
                this.finish("error");
                Poll::Ready(Some(Err(err)))
            }
        }
    }
}

impl fmt::Debug for ReadAll<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadAll")
            .field("handle", &self.handle.id())
            .field("chunk_size", &self.chunk_size)
            .field("offset", &self.offset)
            .field("done", &self.done)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;
    use crate::test_utils::{run_test, temp_file_with};
    use futures_lite::StreamExt;

    fn init_test(name: &str) {
        crate::test_utils::init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn open_rejects_unknown_mode() {
        init_test("open_rejects_unknown_mode");
        let (_dir, path) = temp_file_with(b"abc");
        run_test(|event_loop| async move {
            let err = event_loop.file_open(&path, "w").await.unwrap_err();
            crate::assert_with_log!(
                err.kind() == ErrorKind::InvalidArgument,
                "invalid mode",
                ErrorKind::InvalidArgument,
                err.kind()
            );
        });
        crate::test_complete!("open_rejects_unknown_mode");
    }

    #[test]
    fn open_missing_file_is_io_error() {
        init_test("open_missing_file_is_io_error");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.bin");
        run_test(|event_loop| async move {
            let err = event_loop.file_open(&path, "rb").await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Io);
            assert!(err.raw_os_error().is_some());
            assert!(!path.exists(), "open must not create the file");
        });
        crate::test_complete!("open_missing_file_is_io_error");
    }

    #[test]
    fn read_returns_transferred_prefix() {
        init_test("read_returns_transferred_prefix");
        let (_dir, path) = temp_file_with(b"0123456789");
        run_test(|event_loop| async move {
            let handle = event_loop.file_open(&path, "rb").await.unwrap();
            assert!(event_loop.proactor().is_registered(&handle));
            let data = event_loop.file_read(&handle, 4, 2).await.unwrap();
            assert_eq!(data, b"2345");
            let tail = event_loop.file_read(&handle, 100, 8).await.unwrap();
            crate::assert_with_log!(tail == b"89", "short read", "89", tail);
            let empty = event_loop.file_read(&handle, 0, 0).await.unwrap();
            assert!(empty.is_empty());
            event_loop.file_close(handle).unwrap();
        });
        crate::test_complete!("read_returns_transferred_prefix");
    }

    #[test]
    fn read_at_end_is_eof() {
        init_test("read_at_end_is_eof");
        let (_dir, path) = temp_file_with(b"abc");
        run_test(|event_loop| async move {
            let handle = event_loop.file_open(&path, "rb").await.unwrap();
            let err = event_loop.file_read(&handle, 4, 3).await.unwrap_err();
            assert!(err.is_end_of_file(), "{err}");
            event_loop.file_close(handle).unwrap();
        });
        crate::test_complete!("read_at_end_is_eof");
    }

    #[test]
    fn write_needs_read_write_mode() {
        init_test("write_needs_read_write_mode");
        let (_dir, path) = temp_file_with(b"......");
        let check = path.clone();
        run_test(|event_loop| async move {
            let ro = event_loop.file_open(&path, "rb").await.unwrap();
            assert!(event_loop.file_write(&ro, b"x", 0).await.is_err());
            event_loop.file_close(ro).unwrap();

            let rw = event_loop.file_open(&path, "r+b").await.unwrap();
            let written = event_loop.file_write(&rw, b"ab", 4).await.unwrap();
            assert_eq!(written, 2);
            assert_eq!(event_loop.file_write(&rw, b"", 0).await.unwrap(), 0);
            event_loop.file_close(rw).unwrap();
        });
        assert_eq!(std::fs::read(check).unwrap(), b"....ab");
        crate::test_complete!("write_needs_read_write_mode");
    }

    #[test]
    fn readall_yields_chunks_in_order() {
        init_test("readall_yields_chunks_in_order");
        let (_dir, path) = temp_file_with(b"abcdefghij");
        run_test(|event_loop| async move {
            let handle = event_loop.file_open(&path, "rb").await.unwrap();
            let mut stream = event_loop.file_readall(&handle, 4).unwrap();
            let mut chunks = Vec::new();
            while let Some(chunk) = stream.next().await {
                chunks.push(chunk.unwrap());
            }
            assert!(stream.is_done());
            assert_eq!(stream.offset(), 10);
            assert!(stream.next().await.is_none());
            assert_eq!(chunks, vec![b"abcd".to_vec(), b"efgh".to_vec(), b"ij".to_vec()]);
            event_loop.file_close(handle).unwrap();
        });
        crate::test_complete!("readall_yields_chunks_in_order");
    }

    #[test]
    fn readall_of_empty_file_yields_nothing() {
        init_test("readall_of_empty_file_yields_nothing");
        let (_dir, path) = temp_file_with(b"");
        run_test(|event_loop| async move {
            let handle = event_loop.file_open(&path, "rb").await.unwrap();
            let count = event_loop.file_readall(&handle, 16).unwrap().count().await;
            crate::assert_with_log!(count == 0, "no chunks", 0usize, count);
            event_loop.file_close(handle).unwrap();
        });
        crate::test_complete!("readall_of_empty_file_yields_nothing");
    }

    #[test]
    fn readall_rejects_zero_chunk() {
        init_test("readall_rejects_zero_chunk");
        let (_dir, path) = temp_file_with(b"abc");
        run_test(|event_loop| async move {
            let handle = event_loop.file_open(&path, "rb").await.unwrap();
            let err = event_loop.file_readall(&handle, 0).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::InvalidArgument);
            event_loop.file_close(handle).unwrap();
        });
        crate::test_complete!("readall_rejects_zero_chunk");
    }

    #[test]
    fn close_deregisters() {
        init_test("close_deregisters");
        let (_dir, path) = temp_file_with(b"abc");
        run_test(|event_loop| async move {
            let handle = event_loop.file_open(&path, "rb").await.unwrap();
            let witness = handle.keep_alive();
            event_loop.file_close(handle).unwrap();
            assert!(!event_loop.proactor().is_registered(&witness));
            assert_eq!(witness.ref_count(), 1);
        });
        crate::test_complete!("close_deregisters");
    }
}
