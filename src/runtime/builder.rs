//! Event loop builder and build-time validation.
//!
//! Builders are move-based: each setter takes `self` and returns `Self`, so a
//! configuration reads as one chain and partial state never escapes.
//!
//! ```ignore
//! use portio::runtime::EventLoopBuilder;
//!
//! let event_loop = EventLoopBuilder::new()
//!     .worker_threads(2)
//!     .completion_batch(32)
//!     .build()?;
//! ```
//!
//! Later calls win, which gives the documented precedence when sources are
//! layered in order:
//!
//! ```ignore
//! // Requires the `config-file` feature.
//! let event_loop = EventLoopBuilder::from_toml("portio.toml")?
//!     .with_env_overrides()?
//!     .worker_threads(8)
//!     .build()?;
//! ```

use crate::runtime::config::{Backend, LoopConfig};
use crate::runtime::env_config;
use crate::runtime::event_loop::EventLoop;
use std::time::Duration;

/// Error returned when a configuration cannot produce an event loop.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// A field value failed validation.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// The field that failed validation.
        field: &'static str,
        /// Why the value is invalid.
        reason: String,
    },

    /// The requested backend does not exist on this platform.
    #[error("backend `{backend}` is not available on this platform")]
    BackendUnavailable {
        /// The requested backend.
        backend: Backend,
    },

    /// Starting the loop's OS resources failed.
    #[error("failed to start event loop: {0}")]
    Startup(String),

    /// A custom validation error with arbitrary message.
    #[error("{0}")]
    Custom(String),
}

impl BuildError {
    /// Create a custom error with the given message.
    #[must_use]
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    pub(crate) fn startup(err: impl std::fmt::Display) -> Self {
        Self::Startup(err.to_string())
    }
}

/// Builder for constructing an [`EventLoop`] with custom configuration.
#[derive(Debug, Clone, Default)]
pub struct EventLoopBuilder {
    config: LoopConfig,
}

impl EventLoopBuilder {
    /// Create a new builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: LoopConfig::default(),
        }
    }

    /// Defaults overlaid with `PORTIO_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unparseable value.
    pub fn from_env() -> Result<Self, BuildError> {
        Self::new().with_env_overrides()
    }

    /// Applies `PORTIO_*` environment variables on top of the current values.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an unparseable value.
    pub fn with_env_overrides(mut self) -> Result<Self, BuildError> {
        env_config::apply_env_overrides(&mut self.config)?;
        Ok(self)
    }

    /// Defaults overlaid with a TOML config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    #[cfg(feature = "config-file")]
    pub fn from_toml(path: impl AsRef<std::path::Path>) -> Result<Self, BuildError> {
        let toml = env_config::parse_toml_file(path.as_ref())?;
        let mut builder = Self::new();
        env_config::apply_toml_config(&mut builder.config, &toml)?;
        Ok(builder)
    }

    /// Defaults overlaid with TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text cannot be parsed.
    #[cfg(feature = "config-file")]
    pub fn from_toml_str(toml: &str) -> Result<Self, BuildError> {
        let toml = env_config::parse_toml_str(toml)?;
        let mut builder = Self::new();
        env_config::apply_toml_config(&mut builder.config, &toml)?;
        Ok(builder)
    }

    /// Select the completion backend.
    #[must_use]
    pub fn backend(mut self, backend: Backend) -> Self {
        self.config.backend = backend;
        self
    }

    /// Set the number of blocking pool workers.
    #[must_use]
    pub fn worker_threads(mut self, n: usize) -> Self {
        self.config.worker_threads = n;
        self
    }

    /// Set the worker thread name prefix.
    #[must_use]
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    /// Set how many completions are drained per port poll.
    #[must_use]
    pub fn completion_batch(mut self, batch: usize) -> Self {
        self.config.completion_batch = batch;
        self
    }

    /// Set the upper bound on a single blocking port wait.
    #[must_use]
    pub fn poll_timeout(mut self, timeout: Duration) -> Self {
        self.config.poll_timeout = timeout;
        self
    }

    /// The configuration as it stands.
    #[must_use]
    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Build an event loop from this configuration.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::BackendUnavailable`] for a backend this platform
    /// lacks, or [`BuildError::Startup`] if threads or the port cannot be
    /// created.
    pub fn build(self) -> Result<EventLoop, BuildError> {
        EventLoop::with_config(self.config)
    }
}
