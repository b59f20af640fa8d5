use std::time::Duration;

use thiserror::Error;

/// Failure of one gem operation. Clonable so fan-out results can be kept
/// and compared.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("{name} is not available on this system")]
    NotAvailable { name: &'static str },

    #[error("command failed: {stderr}")]
    CommandFailed { stderr: String },

    #[error("{context}: {details}")]
    Database {
        context: &'static str,
        details: String,
    },

    #[error("I/O error ({kind}): {message}")]
    Io {
        kind: std::io::ErrorKind,
        message: String,
    },

    #[error("{operation} is not supported by this gem")]
    Unsupported { operation: &'static str },

    #[error("{context} failed: {details}")]
    Internal {
        context: &'static str,
        details: String,
    },

    #[error("timed out after {}s", after.as_secs())]
    Timeout { after: Duration },
}

impl BackendError {
    #[must_use]
    pub fn unsupported(operation: &'static str) -> Self {
        Self::Unsupported { operation }
    }

    pub fn database(context: &'static str, details: impl ToString) -> Self {
        Self::Database {
            context,
            details: details.to_string(),
        }
    }

    pub fn internal(context: &'static str, details: impl ToString) -> Self {
        Self::Internal {
            context,
            details: details.to_string(),
        }
    }

    /// Whether retrying later may succeed without user action.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Database { .. })
    }
}

impl From<std::io::Error> for BackendError {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}
