//! Completion-driven event loop.
//!
//! # Overview
//!
//! An [`EventLoop`] owns a completion backend ([`Proactor`]) and a small
//! [`BlockingPool`]. [`EventLoop::block_on`] runs one future on the calling
//! thread; while it waits, the thread drains completion packets from the
//! backend and wakes the operations they belong to.
//!
//! | Backend | Platform | Transfers run on |
//! |---------|----------|------------------|
//! | [`Backend::Iocp`] | Windows | the kernel, via `ReadFile`/`WriteFile` |
//! | [`Backend::Pool`] | any | blocking pool workers, via `pread`/`pwrite` |
//!
//! # Quick Start
//!
//! ```ignore
//! use portio::runtime::EventLoop;
//!
//! let event_loop = EventLoop::new()?;
//! let chunks = event_loop.block_on(portio::fs::readall("data.bin", 64 * 1024))?;
//! ```
//!
//! ## Custom Configuration
//!
//! ```ignore
//! use portio::runtime::{Backend, EventLoopBuilder};
//! use std::time::Duration;
//!
//! let event_loop = EventLoopBuilder::new()
//!     .backend(Backend::Pool)
//!     .worker_threads(8)
//!     .completion_batch(128)
//!     .poll_timeout(Duration::from_millis(20))
//!     .build()?;
//! ```
//!
//! ## Config File + Environment Overrides
//!
//! ```ignore
//! use portio::runtime::EventLoopBuilder;
//!
//! // Requires the `config-file` feature.
//! let event_loop = EventLoopBuilder::from_toml("portio.toml")?
//!     .with_env_overrides()?
//!     .build()?;
//! ```
//!
//! # Configuration Reference (Defaults + Notes)
//!
//! - `backend`: default = `auto` (IOCP on Windows, pool elsewhere).
//! - `worker_threads`: default = 4. Bounds concurrent pool-backend transfers and opens.
//! - `thread_name_prefix`: default = `portio-io`. Improves diagnostics.
//! - `completion_batch`: default = 64. Entries drained per port wait.
//! - `poll_timeout`: default = 100 ms. Upper bound on one blocking port wait.

pub mod blocking_pool;
pub mod builder;
pub mod config;
pub mod env_config;
pub mod event_loop;
pub mod file_ops;
pub mod proactor;
/// Async wrapper for blocking pool operations.
pub mod spawn_blocking;

pub use blocking_pool::{BlockingPool, BlockingPoolHandle};
pub use builder::{BuildError, EventLoopBuilder};
pub use config::{Backend, LoopConfig};
pub use event_loop::{EventLoop, EventLoopHandle};
pub use file_ops::ReadAll;
pub use proactor::{Completion, OffsetWords, OpKind, OverlappedRequest, PoolProactor, Proactor, Transfer};
pub use spawn_blocking::{spawn_blocking, spawn_blocking_io, BlockingTask};

#[cfg(target_os = "windows")]
pub use proactor::IocpProactor;
