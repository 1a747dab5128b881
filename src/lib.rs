//! Portio: positional async file I/O multiplexed through a completion port.
//!
//! # Overview
//!
//! Every read and write is a positional transfer: the caller supplies the
//! byte offset and the transfer is handed to a completion backend. The
//! event loop thread waits on the backend's port and wakes each operation
//! when its packet arrives. Files keep their own cursor so sequential code
//! reads naturally while many files (or many offsets of one file) are in
//! flight at once.
//!
//! # Core Guarantees
//!
//! - **Positional transfers**: No operation depends on the OS file pointer
//! - **Cursor advances by bytes transferred**: Short reads move the cursor by what was read
//! - **One end-of-file sentinel**: Only the chunk stream treats it as termination
//! - **Handles are released on every path**: Close, drop and cancellation all free the handle
//!
//! # Module Structure
//!
//! - [`error`]: Error types
//! - [`fs`]: [`AsyncFile`], [`open`] and [`readall`]
//! - [`runtime`]: Event loop, completion backends and the blocking pool
//!
//! # Example
//!
//! ```ignore
//! use portio::runtime::EventLoop;
//!
//! let event_loop = EventLoop::new()?;
//! let chunks = event_loop.block_on(portio::readall("data.bin", 1024 * 1024))?;
//! println!("{chunks} chunks");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]

pub mod error;
pub mod fs;
pub mod runtime;

#[cfg(test)]
pub(crate) mod test_utils;

pub use error::{
    Error, ErrorCategory, ErrorKind, Recoverability, Result, ResultExt, ERROR_HANDLE_EOF,
};
pub use fs::{open, open_with, readall, AsyncFile, FileHandle, OpenMode, Whence};
pub use runtime::{Backend, EventLoop, EventLoopBuilder, EventLoopHandle};
