//! Environment variable and config file support for [`EventLoopBuilder`](super::builder::EventLoopBuilder).
//!
//! # Configuration Precedence
//!
//! Settings are resolved in this order (highest priority first):
//!
//! 1. **Programmatic**: values set via builder methods (`worker_threads(4)`)
//! 2. **Environment variables**: values from `PORTIO_*` env vars
//! 3. **Config file**: values loaded from a TOML file (requires `config-file` feature)
//! 4. **Defaults**: built-in defaults from [`LoopConfig::default()`]
//!
//! # Supported Environment Variables
//!
//! | Variable | Type | Maps to |
//! |----------|------|---------|
//! | `PORTIO_BACKEND` | `auto`/`iocp`/`pool` | `backend` |
//! | `PORTIO_WORKER_THREADS` | `usize` | `worker_threads` |
//! | `PORTIO_THREAD_NAME_PREFIX` | `String` | `thread_name_prefix` |
//! | `PORTIO_COMPLETION_BATCH` | `usize` | `completion_batch` |
//! | `PORTIO_POLL_TIMEOUT_MS` | `u64` | `poll_timeout` |

use crate::runtime::builder::BuildError;
use crate::runtime::config::{Backend, LoopConfig};
use std::time::Duration;

/// Environment variable name for the completion backend.
pub const ENV_BACKEND: &str = "PORTIO_BACKEND";
/// Environment variable name for worker thread count.
pub const ENV_WORKER_THREADS: &str = "PORTIO_WORKER_THREADS";
/// Environment variable name for thread name prefix.
pub const ENV_THREAD_NAME_PREFIX: &str = "PORTIO_THREAD_NAME_PREFIX";
/// Environment variable name for the per-poll completion batch.
pub const ENV_COMPLETION_BATCH: &str = "PORTIO_COMPLETION_BATCH";
/// Environment variable name for the port wait bound in milliseconds.
pub const ENV_POLL_TIMEOUT_MS: &str = "PORTIO_POLL_TIMEOUT_MS";

/// Every variable read by [`apply_env_overrides`].
pub const ALL_ENV_VARS: &[&str] = &[
    ENV_BACKEND,
    ENV_WORKER_THREADS,
    ENV_THREAD_NAME_PREFIX,
    ENV_COMPLETION_BATCH,
    ENV_POLL_TIMEOUT_MS,
];

/// Apply environment variable overrides to a [`LoopConfig`].
///
/// Only variables that are set in the environment are applied.
/// Returns an error if a variable is set but contains an unparseable value.
pub fn apply_env_overrides(config: &mut LoopConfig) -> Result<(), BuildError> {
    if let Some(val) = read_env(ENV_BACKEND) {
        config.backend = parse_backend(ENV_BACKEND, &val)?;
    }
    if let Some(val) = read_env(ENV_WORKER_THREADS) {
        config.worker_threads = parse_usize(ENV_WORKER_THREADS, &val)?;
    }
    if let Some(val) = read_env(ENV_THREAD_NAME_PREFIX) {
        config.thread_name_prefix = val;
    }
    if let Some(val) = read_env(ENV_COMPLETION_BATCH) {
        config.completion_batch = parse_usize(ENV_COMPLETION_BATCH, &val)?;
    }
    if let Some(val) = read_env(ENV_POLL_TIMEOUT_MS) {
        config.poll_timeout = Duration::from_millis(parse_u64(ENV_POLL_TIMEOUT_MS, &val)?);
    }
    Ok(())
}

/// Read an environment variable, returning `None` if unset.
fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn parse_usize(var_name: &str, val: &str) -> Result<usize, BuildError> {
    val.trim().parse::<usize>().map_err(|e| {
        BuildError::custom(format!(
            "invalid value for {var_name}: expected unsigned integer, got {val:?} ({e})"
        ))
    })
}

fn parse_u64(var_name: &str, val: &str) -> Result<u64, BuildError> {
    val.trim().parse::<u64>().map_err(|e| {
        BuildError::custom(format!(
            "invalid value for {var_name}: expected milliseconds, got {val:?} ({e})"
        ))
    })
}

fn parse_backend(var_name: &str, val: &str) -> Result<Backend, BuildError> {
    val.parse::<Backend>().map_err(|_| {
        BuildError::custom(format!(
            "invalid value for {var_name}: expected auto, iocp or pool, got {val:?}"
        ))
    })
}

// =========================================================================
// TOML config file support (feature-gated)
// =========================================================================

/// TOML-deserializable loop configuration.
///
/// ```toml
/// [io]
/// backend = "pool"
/// worker_threads = 8
/// thread_name_prefix = "myapp-io"
///
/// [completion]
/// batch = 128
/// poll_timeout_ms = 50
/// ```
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct LoopTomlConfig {
    /// Backend and worker settings.
    #[serde(default)]
    pub io: IoToml,
    /// Completion draining settings.
    #[serde(default)]
    pub completion: CompletionToml,
}

/// `[io]` section of the TOML config.
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct IoToml {
    /// Backend name.
    pub backend: Option<String>,
    /// Number of blocking pool workers.
    pub worker_threads: Option<usize>,
    /// Name prefix for worker threads.
    pub thread_name_prefix: Option<String>,
}

/// `[completion]` section of the TOML config.
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct CompletionToml {
    /// Completion entries drained per poll.
    pub batch: Option<usize>,
    /// Port wait bound in milliseconds.
    pub poll_timeout_ms: Option<u64>,
}

/// Apply a parsed TOML config to a [`LoopConfig`].
///
/// Only fields that are `Some` in the TOML struct override the config.
#[cfg(feature = "config-file")]
pub fn apply_toml_config(config: &mut LoopConfig, toml: &LoopTomlConfig) -> Result<(), BuildError> {
    if let Some(ref v) = toml.io.backend {
        config.backend = v.parse()?;
    }
    if let Some(v) = toml.io.worker_threads {
        config.worker_threads = v;
    }
    if let Some(ref v) = toml.io.thread_name_prefix {
        config.thread_name_prefix.clone_from(v);
    }
    if let Some(v) = toml.completion.batch {
        config.completion_batch = v;
    }
    if let Some(v) = toml.completion.poll_timeout_ms {
        config.poll_timeout = Duration::from_millis(v);
    }
    Ok(())
}

/// Parse a TOML string into a [`LoopTomlConfig`].
#[cfg(feature = "config-file")]
pub fn parse_toml_str(toml_str: &str) -> Result<LoopTomlConfig, BuildError> {
    toml::from_str(toml_str)
        .map_err(|e| BuildError::custom(format!("failed to parse TOML config: {e}")))
}

/// Read and parse a TOML file into a [`LoopTomlConfig`].
#[cfg(feature = "config-file")]
pub fn parse_toml_file(path: &std::path::Path) -> Result<LoopTomlConfig, BuildError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        BuildError::custom(format!(
            "failed to read config file {}: {e}",
            path.display()
        ))
    })?;
    parse_toml_str(&content)
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn with_clean_env<F, R>(f: F) -> R
    where
        F: FnOnce() -> R,
    {
        let _guard = crate::test_utils::env_lock();
        clean_env_locked();
        f()
    }

    fn with_envs<F, R>(vars: &[(&str, &str)], f: F) -> R
    where
        F: FnOnce() -> R,
    {
        with_clean_env(|| {
            for (k, v) in vars {
                std::env::set_var(k, v);
            }
            let result = f();
            for (k, _) in vars {
                std::env::remove_var(k);
            }
            result
        })
    }

    fn clean_env_locked() {
        for var in ALL_ENV_VARS {
            std::env::remove_var(var);
        }
    }

    // --- parse helpers ---

    #[test]
    fn parse_usize_valid() {
        assert_eq!(super::parse_usize("TEST", "42").unwrap(), 42);
        assert_eq!(super::parse_usize("TEST", " 100 ").unwrap(), 100);
        assert_eq!(super::parse_usize("TEST", "0").unwrap(), 0);
    }

    #[test]
    fn parse_usize_invalid() {
        assert!(super::parse_usize("TEST", "abc").is_err());
        assert!(super::parse_usize("TEST", "-1").is_err());
        assert!(super::parse_usize("TEST", "").is_err());
    }

    #[test]
    fn parse_backend_names_the_variable() {
        let err = super::parse_backend(ENV_BACKEND, "kqueue").unwrap_err();
        assert!(err.to_string().contains(ENV_BACKEND), "{err}");
    }

    // --- apply_env_overrides ---

    #[test]
    fn no_env_keeps_defaults() {
        with_clean_env(|| {
            let mut config = LoopConfig::default();
            apply_env_overrides(&mut config).unwrap();
            assert_eq!(config, LoopConfig::default());
        });
    }

    #[test]
    fn env_overrides_all_fields() {
        with_envs(
            &[
                (ENV_BACKEND, "pool"),
                (ENV_WORKER_THREADS, "9"),
                (ENV_THREAD_NAME_PREFIX, "svc-io"),
                (ENV_COMPLETION_BATCH, "7"),
                (ENV_POLL_TIMEOUT_MS, "25"),
            ],
            || {
                let mut config = LoopConfig::default();
                apply_env_overrides(&mut config).unwrap();
                assert_eq!(config.backend, Backend::Pool);
                assert_eq!(config.worker_threads, 9);
                assert_eq!(config.thread_name_prefix, "svc-io");
                assert_eq!(config.completion_batch, 7);
                assert_eq!(config.poll_timeout, Duration::from_millis(25));
            },
        );
    }

    #[test]
    fn env_invalid_value_is_error() {
        with_envs(&[(ENV_WORKER_THREADS, "many")], || {
            let mut config = LoopConfig::default();
            let err = apply_env_overrides(&mut config).unwrap_err();
            assert!(err.to_string().contains(ENV_WORKER_THREADS), "{err}");
        });
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn toml_overrides_present_fields_only() {
        let toml = parse_toml_str(
            r#"
            [io]
            backend = "pool"
            worker_threads = 2

            [completion]
            poll_timeout_ms = 10
            "#,
        )
        .unwrap();
        let mut config = LoopConfig::default();
        apply_toml_config(&mut config, &toml).unwrap();
        assert_eq!(config.backend, Backend::Pool);
        assert_eq!(config.worker_threads, 2);
        assert_eq!(config.poll_timeout, Duration::from_millis(10));
        assert_eq!(config.completion_batch, LoopConfig::default().completion_batch);
    }

    #[cfg(feature = "config-file")]
    #[test]
    fn toml_parse_error() {
        assert!(parse_toml_str("[io\nworker_threads = ").is_err());
    }
}
