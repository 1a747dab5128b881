//! Path-level entry points.
//!
//! These run inside [`EventLoop::block_on`](crate::runtime::EventLoop::block_on)
//! and use the loop returned by [`EventLoopHandle::current`].

use super::file::AsyncFile;
use crate::error::{Error, Result};
use crate::runtime::EventLoopHandle;
use futures_lite::StreamExt;
use std::path::Path;

/// Opens `path` for reading (`"rb"`) with the cursor at 0.
///
/// Use [`open_with`] to pass a mode, for example `"r+b"` to allow writes.
///
/// # Errors
///
/// `NoEventLoop` outside a running loop; the OS error if the open fails.
pub async fn open(path: impl AsRef<Path>) -> Result<AsyncFile> {
    open_with(path, "rb").await
}

/// Opens `path` with `mode` (`"rb"` or `"r+b"`) with the cursor at 0.
///
/// # Errors
///
/// `InvalidArgument` for any other mode; otherwise as [`open`].
pub async fn open_with(path: impl AsRef<Path>, mode: &str) -> Result<AsyncFile> {
    let event_loop = EventLoopHandle::current()?;
    let handle = event_loop.file_open(path, mode).await?;
    Ok(AsyncFile::new(handle, event_loop))
}

/// Reads the whole file in `chunk_size` pieces and returns the number of
/// chunks read.
///
/// The file is closed on every exit path, including cancellation.
///
/// # Errors
///
/// `InvalidArgument` if `chunk_size` is zero; any error other than end of
/// file raised while reading.
pub async fn readall(path: impl AsRef<Path>, chunk_size: usize) -> Result<usize> {
    if chunk_size == 0 {
        return Err(Error::invalid_argument("chunk size must be positive"));
    }
    let mut file = open(path).await?;
    let counted = count_chunks(&file, chunk_size).await;
    let closed = file.close();
    let chunks = counted?;
    closed?;
    Ok(chunks)
}

async fn count_chunks(file: &AsyncFile, chunk_size: usize) -> Result<usize> {
    let event_loop = EventLoopHandle::current()?;
    let mut chunks = event_loop.file_readall(file.handle()?, chunk_size)?;
    let mut count = 0;
    while let Some(chunk) = chunks.next().await {
        chunk?;
        count += 1;
    }
    tracing::debug!(handle = ?file.handle_id(), chunks = count, "readall finished");
    Ok(count)
}
