//! Async positional file I/O.
//!
//! Files are opened through the running event loop and every transfer is a
//! positional read or write submitted to its completion backend.
//!
//! # Cancel Safety
//!
//! - `open`, `open_with`: Cancel-safe (the handle is dropped with the future)
//! - `AsyncFile::read` / `write`: Dropping the future stops the wait, not the
//!   transfer; the cursor is not advanced
//! - `readall`: Cancel-safe; the file is released when the future is dropped
//!
//! # Example
//!
//! ```ignore
//! use portio::fs::{self, Whence};
//! use portio::runtime::EventLoop;
//!
//! let event_loop = EventLoop::new()?;
//! event_loop.block_on(async {
//!     let mut file = fs::open_with("data.bin", "r+b").await?;
//!     file.write(b"asd").await?;
//!     file.seek(0, Whence::Set)?;
//!     let data = file.read(3).await?;
//!     file.close()?;
//!     Ok::<_, portio::Error>(data)
//! })?;
//! ```

mod file;
pub(crate) mod handle;
mod open_mode;
mod path_ops;

pub use file::{AsyncFile, Whence};
pub use handle::{next_handle_id, FileHandle, RawHandle};
pub use open_mode::OpenMode;
pub use path_ops::{open, open_with, readall};
