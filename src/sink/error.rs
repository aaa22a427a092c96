//! Sink Errors
//!
//! `UploadError` is what every blob store backend returns: a message plus
//! whatever HTTP status and service error code the transport could surface,
//! optionally wrapping an underlying cause. `FlushError` is the classified
//! outcome handed back to the host framework.

use std::fmt;

/// Failure reported by a blob store write step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadError {
    message: String,
    status_code: Option<u16>,
    error_code: Option<String>,
    cause: Option<Box<UploadError>>,
}

impl UploadError {
    pub fn new(message: impl Into<String>) -> Self {
        UploadError {
            message: message.into(),
            status_code: None,
            error_code: None,
            cause: None,
        }
    }

    pub fn with_status(mut self, status_code: u16) -> Self {
        self.status_code = Some(status_code);
        self
    }

    pub fn with_error_code(mut self, error_code: impl Into<String>) -> Self {
        self.error_code = Some(error_code.into());
        self
    }

    /// Wrap an underlying failure
    pub fn caused_by(mut self, cause: UploadError) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    pub fn error_code(&self) -> Option<&str> {
        self.error_code.as_deref()
    }

    pub fn cause(&self) -> Option<&UploadError> {
        self.cause.as_deref()
    }
}

impl fmt::Display for UploadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(status) = self.status_code {
            write!(f, " (status {})", status)?;
        }
        if let Some(code) = &self.error_code {
            write!(f, " [{}]", code)?;
        }
        Ok(())
    }
}

impl std::error::Error for UploadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause
            .as_deref()
            .map(|c| c as &(dyn std::error::Error + 'static))
    }
}

impl From<std::io::Error> for UploadError {
    fn from(e: std::io::Error) -> Self {
        UploadError::new(format!("I/O error: {}", e))
    }
}

/// Classified flush failure
///
/// In both cases the buffer is left untouched, so nothing is lost.
#[derive(Debug, thiserror::Error)]
pub enum FlushError {
    /// Retrying with the same credential cannot succeed
    #[error(
        "authentication/authorization failure while writing {key}. \
         Check SAS token permissions/expiry."
    )]
    FatalAuth {
        key: String,
        #[source]
        source: UploadError,
    },

    /// The same write may succeed if attempted again
    #[error("transient error while writing {key}")]
    Retriable {
        key: String,
        #[source]
        source: UploadError,
    },
}

impl FlushError {
    pub fn is_retriable(&self) -> bool {
        matches!(self, FlushError::Retriable { .. })
    }

    /// Destination key of the failed write
    pub fn key(&self) -> &str {
        match self {
            FlushError::FatalAuth { key, .. } | FlushError::Retriable { key, .. } => key,
        }
    }
}

/// Error surfaced by `SinkTask` to the host framework
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error(transparent)]
    Flush(#[from] FlushError),

    /// A previous fatal failure stopped the task
    #[error("sink task halted after fatal failure: {0}")]
    Halted(String),

    #[error("invalid configuration: {0}")]
    Config(#[from] crate::sink::config::ConfigError),

    /// The store client could not be built
    #[error("store setup failed: {0}")]
    Store(UploadError),

    #[error("unsupported: {0}")]
    Unsupported(&'static str),
}

impl SinkError {
    /// Whether the host should redeliver the batch
    pub fn is_retriable(&self) -> bool {
        match self {
            SinkError::Flush(e) => e.is_retriable(),
            _ => false,
        }
    }
}
