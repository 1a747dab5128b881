//! Open-mode strings accepted by the file operations.
//!
//! Only two modes exist: `"rb"` (read) and `"r+b"` (read/write). Neither
//! truncates, appends, creates the file or translates text; every other
//! string is rejected before any I/O is attempted.

use crate::error::{Error, Result};
use std::fmt;
use std::fs::OpenOptions;
use std::str::FromStr;

/// How a file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OpenMode {
    /// `"rb"`: open an existing file for reading.
    #[default]
    Read,
    /// `"r+b"`: open an existing file for reading and writing.
    ReadWrite,
}

impl OpenMode {
    /// Parses a mode string.
    ///
    /// # Errors
    ///
    /// Returns an `InvalidArgument` error for anything but `"rb"` or `"r+b"`.
    pub fn parse(mode: &str) -> Result<Self> {
        match mode {
            "rb" => Ok(Self::Read),
            "r+b" => Ok(Self::ReadWrite),
            other => Err(Error::invalid_argument(format!(
                "unsupported mode: {other:?}"
            ))),
        }
    }

    /// The canonical mode string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Read => "rb",
            Self::ReadWrite => "r+b",
        }
    }

    /// Returns true if the mode allows writes.
    #[must_use]
    pub const fn is_writable(self) -> bool {
        matches!(self, Self::ReadWrite)
    }

    /// Std open options for this mode.
    #[must_use]
    pub fn open_options(self) -> OpenOptions {
        let mut options = OpenOptions::new();
        options.read(true).write(self.is_writable());
        options
    }
}

impl FromStr for OpenMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for OpenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
