//! Event loop configuration types.
//!
//! These types hold the concrete values that drive loop behavior. In most
//! cases you should use [`EventLoopBuilder`](super::builder::EventLoopBuilder)
//! to construct a loop rather than creating a [`LoopConfig`] directly.
//!
//! # Defaults
//!
//! | Field | Default |
//! |-------|---------|
//! | `backend` | [`Backend::Auto`] |
//! | `worker_threads` | 4 |
//! | `thread_name_prefix` | `"portio-io"` |
//! | `completion_batch` | 64 |
//! | `poll_timeout` | 100 ms |

use crate::runtime::builder::BuildError;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Default number of blocking pool workers.
pub const DEFAULT_WORKER_THREADS: usize = 4;
/// Default worker thread name prefix.
pub const DEFAULT_THREAD_NAME_PREFIX: &str = "portio-io";
/// Default number of completion entries drained per port poll.
pub const DEFAULT_COMPLETION_BATCH: usize = 64;
/// Default upper bound on a single blocking port wait.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Which completion backend drives positional I/O.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Backend {
    /// Native completion port on Windows, thread pool elsewhere.
    #[default]
    Auto,
    /// Windows I/O completion port.
    Iocp,
    /// Blocking pool simulating a completion port.
    Pool,
}

impl Backend {
    /// Resolves `Auto` for the current platform.
    #[must_use]
    pub const fn resolve(self) -> Self {
        match self {
            Self::Auto => {
                if cfg!(windows) {
                    Self::Iocp
                } else {
                    Self::Pool
                }
            }
            other => other,
        }
    }

    /// Returns true if the backend can run on this platform.
    #[must_use]
    pub const fn is_available(self) -> bool {
        match self {
            Self::Auto | Self::Pool => true,
            Self::Iocp => cfg!(windows),
        }
    }

    /// Lowercase name used in env vars and config files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Iocp => "iocp",
            Self::Pool => "pool",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Backend {
    type Err = BuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "iocp" => Ok(Self::Iocp),
            "pool" => Ok(Self::Pool),
            _ => Err(BuildError::InvalidValue {
                field: "backend",
                reason: format!("expected auto, iocp or pool, got {s:?}"),
            }),
        }
    }
}

/// Event loop configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopConfig {
    /// Completion backend.
    pub backend: Backend,
    /// Number of blocking pool workers (opens, pool-backend transfers).
    pub worker_threads: usize,
    /// Name prefix for worker threads.
    pub thread_name_prefix: String,
    /// Completion entries drained per port poll.
    pub completion_batch: usize,
    /// Upper bound on a single blocking port wait.
    pub poll_timeout: Duration,
}

impl LoopConfig {
    /// Normalize configuration values to safe defaults.
    pub fn normalize(&mut self) {
        if self.worker_threads == 0 {
            self.worker_threads = 1;
        }
        if self.completion_batch == 0 {
            self.completion_batch = 1;
        }
        if self.poll_timeout.is_zero() {
            self.poll_timeout = Duration::from_millis(1);
        }
        if self.thread_name_prefix.is_empty() {
            self.thread_name_prefix = DEFAULT_THREAD_NAME_PREFIX.to_string();
        }
    }
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Auto,
            worker_threads: DEFAULT_WORKER_THREADS,
            thread_name_prefix: DEFAULT_THREAD_NAME_PREFIX.to_string(),
            completion_batch: DEFAULT_COMPLETION_BATCH,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
        }
    }
}
