//! Error handling for the aoetrie library
//!
//! A single crate-wide error type covering argument validation, persistence
//! I/O, file validation and internal invariants.

use thiserror::Error;

/// Main error type for the aoetrie library
#[derive(Error, Debug)]
pub enum Error {
    /// I/O related errors during build or load
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Caller passed an argument outside the accepted domain
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Error message describing the issue
        message: String,
    },

    /// A persisted file failed validation (magic or layout mismatch)
    #[error("File corrupted: {message}")]
    Corrupted {
        /// Error message describing the mismatch
        message: String,
    },

    /// Operation not available on this engine instance
    #[error("Not supported: {operation}")]
    Unsupported {
        /// Description of the rejected operation
        operation: String,
    },

    /// Broken internal invariant; indicates a bug in the library
    #[error("Internal invariant violated: {message}")]
    Internal {
        /// Error message describing the violated invariant
        message: String,
    },
}

impl Error {
    /// Create an invalid argument error
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a file corrupted error
    pub fn corrupted<S: Into<String>>(message: S) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }

    /// Create a not supported error
    pub fn unsupported<S: Into<String>>(operation: S) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    /// Create an internal invariant error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create an I/O error from a message
    pub fn io_error<S: Into<String>>(message: S) -> Self {
        Self::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            message.into(),
        ))
    }

    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Io(_) => "io",
            Self::InvalidArgument { .. } => "argument",
            Self::Corrupted { .. } => "corrupted",
            Self::Unsupported { .. } => "unsupported",
            Self::Internal { .. } => "internal",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, Error>;
