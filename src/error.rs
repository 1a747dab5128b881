//! Error types and error handling strategy for portio.
//!
//! Every fallible operation in the crate returns [`Result<T>`]. Errors follow
//! these principles:
//!
//! - Errors are explicit and typed via [`ErrorKind`]
//! - OS failures keep their raw code so callers can inspect it
//! - Argument errors are raised before any I/O is attempted
//! - Nothing in this crate retries; failures surface to the nearest caller
//!
//! # Error Categories
//!
//! - **Argument**: unsupported open mode, unknown whence, bad chunk size
//! - **State**: I/O attempted on a closed file, no running event loop
//! - **Completion**: the end-of-file completion sentinel
//! - **Os**: any other failure reported by the operating system
//! - **Internal**: broken invariants inside the proactor
//!
//! A peer closing a pipe-like handle while a transfer is being issued is *not*
//! an error: the proactor resolves it as a zero-byte transfer.

use core::fmt;
use std::io;
use std::sync::Arc;

/// Native completion error code meaning "reached the end of the file".
///
/// This is `ERROR_HANDLE_EOF` on Windows. The portable backend reports the
/// same code so callers see one sentinel everywhere.
pub const ERROR_HANDLE_EOF: i32 = 38;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // === Argument ===
    /// An argument was rejected before any I/O was attempted.
    InvalidArgument,
    /// The operation is not supported by this abstraction.
    Unsupported,

    // === State ===
    /// The file handle has already been released.
    Closed,
    /// No event loop is running on the current thread.
    NoEventLoop,

    // === Completion ===
    /// The transfer completed with the end-of-file sentinel.
    EndOfFile,

    // === Os ===
    /// Any other operating system failure.
    Io,

    // === Internal ===
    /// Internal invariant violated (bug).
    Internal,
}

impl ErrorKind {
    /// Returns the error category for this kind.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidArgument | Self::Unsupported => ErrorCategory::Argument,
            Self::Closed | Self::NoEventLoop => ErrorCategory::State,
            Self::EndOfFile => ErrorCategory::Completion,
            Self::Io => ErrorCategory::Os,
            Self::Internal => ErrorCategory::Internal,
        }
    }

    /// Returns the recoverability classification for this error kind.
    #[must_use]
    pub const fn recoverability(&self) -> Recoverability {
        match self {
            Self::InvalidArgument
            | Self::Unsupported
            | Self::Closed
            | Self::NoEventLoop
            | Self::Internal => Recoverability::Permanent,
            Self::EndOfFile | Self::Io => Recoverability::Unknown,
        }
    }
}

/// Classification of error recoverability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Recoverability {
    /// Temporary failure that may succeed on retry.
    Transient,
    /// Permanent failure that will not succeed on retry.
    Permanent,
    /// Recoverability depends on context and cannot be determined
    /// from the error kind alone.
    Unknown,
}

impl Recoverability {
    /// Returns true if this error is safe to retry.
    #[must_use]
    pub const fn should_retry(&self) -> bool {
        matches!(self, Self::Transient)
    }

    /// Returns true if this error should never be retried.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self, Self::Permanent)
    }
}

/// High-level error category for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Rejected arguments.
    Argument,
    /// Operation issued in the wrong state.
    State,
    /// Completion sentinels.
    Completion,
    /// Operating system failures.
    Os,
    /// Internal errors.
    Internal,
}

/// The main error type for portio operations.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    os_code: Option<i32>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            os_code: None,
            source: None,
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Adds a message description to the error.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Creates an invalid-argument error.
    #[must_use]
    pub fn invalid_argument(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument).with_message(detail)
    }

    /// Creates an unsupported-operation error.
    #[must_use]
    pub fn unsupported(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unsupported).with_message(detail)
    }

    /// Creates the error returned for I/O on a released handle.
    #[must_use]
    pub fn closed() -> Self {
        Self::new(ErrorKind::Closed).with_message("I/O operation on closed file")
    }

    /// Creates the end-of-file completion sentinel.
    #[must_use]
    pub fn end_of_file() -> Self {
        Self {
            kind: ErrorKind::EndOfFile,
            message: Some("reached the end of the file".to_string()),
            os_code: Some(ERROR_HANDLE_EOF),
            source: None,
        }
    }

    /// Creates an error from a raw OS error code.
    ///
    /// The end-of-file code maps to [`ErrorKind::EndOfFile`].
    #[must_use]
    pub fn from_raw_os_error(code: i32) -> Self {
        if code == ERROR_HANDLE_EOF && cfg!(windows) {
            return Self::end_of_file();
        }
        io::Error::from_raw_os_error(code).into()
    }

    /// Creates an internal error (bug).
    #[must_use]
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal).with_message(detail)
    }

    /// Returns true if this is the end-of-file completion sentinel.
    #[must_use]
    pub const fn is_end_of_file(&self) -> bool {
        matches!(self.kind, ErrorKind::EndOfFile)
    }

    /// Returns true if the error was caused by a closed handle.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        matches!(self.kind, ErrorKind::Closed)
    }

    /// Returns the raw OS error code, if the OS reported one.
    #[must_use]
    pub const fn raw_os_error(&self) -> Option<i32> {
        self.os_code
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Returns the recoverability classification.
    #[must_use]
    pub const fn recoverability(&self) -> Recoverability {
        self.kind.recoverability()
    }

    /// Returns the error message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Converts into a `std::io::Error` for interop with std-based code.
    #[must_use]
    pub fn into_io(self) -> io::Error {
        if let Some(code) = self.os_code {
            if !self.is_end_of_file() {
                return io::Error::from_raw_os_error(code);
            }
        }
        let kind = match self.kind {
            ErrorKind::InvalidArgument => io::ErrorKind::InvalidInput,
            ErrorKind::Unsupported => io::ErrorKind::Unsupported,
            ErrorKind::EndOfFile => io::ErrorKind::UnexpectedEof,
            ErrorKind::Closed | ErrorKind::NoEventLoop | ErrorKind::Io | ErrorKind::Internal => {
                io::ErrorKind::Other
            }
        };
        io::Error::new(kind, self)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        if let Some(code) = self.os_code {
            write!(f, " (os error {code})")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source.as_ref().map(|e| e.as_ref() as _)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        let kind = match e.kind() {
            io::ErrorKind::UnexpectedEof => return Self::end_of_file(),
            io::ErrorKind::InvalidInput => ErrorKind::InvalidArgument,
            io::ErrorKind::Unsupported => ErrorKind::Unsupported,
            _ => ErrorKind::Io,
        };
        Self {
            kind,
            message: Some(e.to_string()),
            os_code: e.raw_os_error(),
            source: Some(Arc::new(e)),
        }
    }
}

impl From<Error> for io::Error {
    fn from(e: Error) -> Self {
        e.into_io()
    }
}

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Attach a context message on error.
    fn context(self, msg: impl Into<String>) -> Result<T>;
    /// Attach context message computed lazily on error.
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for core::result::Result<T, E> {
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.into().with_message(msg))
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| e.into().with_message(f()))
    }
}

/// A specialized Result type for portio operations.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn display_without_message() {
        let err = Error::new(ErrorKind::Internal);
        assert_eq!(err.to_string(), "Internal");
    }

    #[test]
    fn display_with_message_and_code() {
        let err = Error::end_of_file();
        assert_eq!(
            err.to_string(),
            "EndOfFile: reached the end of the file (os error 38)"
        );
    }

    #[test]
    fn io_error_keeps_code_and_source() {
        let io_err = io::Error::from_raw_os_error(13);
        let err: Error = io_err.into();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.raw_os_error(), Some(13));
        assert!(err.source().is_some());
    }

    #[test]
    fn unexpected_eof_maps_to_sentinel() {
        let err: Error = io::Error::from(io::ErrorKind::UnexpectedEof).into();
        assert!(err.is_end_of_file());
        assert_eq!(err.raw_os_error(), Some(ERROR_HANDLE_EOF));
    }

    #[test]
    fn argument_errors_are_permanent() {
        assert!(Error::invalid_argument("mode").recoverability().is_permanent());
        assert!(Error::unsupported("whence").recoverability().is_permanent());
        assert!(Error::closed().recoverability().is_permanent());
        assert!(!Error::end_of_file().recoverability().should_retry());
    }

    #[test]
    fn categories() {
        assert_eq!(ErrorKind::InvalidArgument.category(), ErrorCategory::Argument);
        assert_eq!(ErrorKind::Closed.category(), ErrorCategory::State);
        assert_eq!(ErrorKind::EndOfFile.category(), ErrorCategory::Completion);
        assert_eq!(ErrorKind::Io.category(), ErrorCategory::Os);
    }

    #[test]
    fn into_io_round_trips_kinds() {
        let io_err = Error::invalid_argument("bad").into_io();
        assert_eq!(io_err.kind(), io::ErrorKind::InvalidInput);

        let io_err = Error::end_of_file().into_io();
        assert_eq!(io_err.kind(), io::ErrorKind::UnexpectedEof);

        let io_err = Error::from_raw_os_error(2).into_io();
        assert_eq!(io_err.raw_os_error(), Some(2));
    }

    #[test]
    fn result_ext_context() {
        let res: core::result::Result<(), io::Error> =
            Err(io::Error::from(io::ErrorKind::PermissionDenied));
        let err = res.context("opening data file").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.message(), Some("opening data file"));
    }
}
