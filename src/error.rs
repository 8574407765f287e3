//! Error types for zero-pgstmt.

use thiserror::Error;

/// Result type for zero-pgstmt operations.
pub type Result<T> = core::result::Result<T, Error>;

/// PostgreSQL error/notice field types.
#[derive(Debug, Clone, Default)]
pub struct ErrorFields {
    /// Severity: ERROR, FATAL, PANIC, WARNING, NOTICE, DEBUG, INFO, LOG
    pub severity: Option<String>,
    /// Non-localized severity (same as severity but never translated)
    pub severity_non_localized: Option<String>,
    /// SQLSTATE error code (5 characters)
    pub code: Option<String>,
    /// Primary error message
    pub message: Option<String>,
    /// Detailed error explanation
    pub detail: Option<String>,
    /// Suggestion for fixing the error
    pub hint: Option<String>,
    /// Cursor position in the actual command text (1-based)
    pub position: Option<u32>,
    /// Context/stack trace
    pub where_: Option<String>,
    /// Table name
    pub table: Option<String>,
    /// Column name
    pub column: Option<String>,
    /// Constraint name
    pub constraint: Option<String>,
}

impl std::fmt::Display for ErrorFields {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(severity) = &self.severity {
            write!(f, "{}: ", severity)?;
        }
        if let Some(message) = &self.message {
            write!(f, "{}", message)?;
        }
        if let Some(code) = &self.code {
            write!(f, " (SQLSTATE {})", code)?;
        }
        if let Some(detail) = &self.detail {
            write!(f, "\nDETAIL: {}", detail)?;
        }
        if let Some(hint) = &self.hint {
            write!(f, "\nHINT: {}", hint)?;
        }
        Ok(())
    }
}

/// Error type for zero-pgstmt.
#[derive(Debug, Error)]
pub enum Error {
    /// Server error response
    #[error("PostgreSQL error: {0}")]
    Server(ErrorFields),

    /// Protocol error (malformed message, unexpected response, etc.)
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Value could not be decoded into the requested type
    #[error("Decode error: {0}")]
    Decode(String),

    /// Invalid usage (e.g., bad option value)
    #[error("Invalid usage: {0}")]
    InvalidUsage(String),

    /// A parameter was handed to a second statement
    #[error("parameter '{name}' already used in another statement")]
    ParameterAlreadyBound {
        /// Name of the offending parameter
        name: String,
    },

    /// An execution method was called on a closed statement
    #[error("statement '{name}' is closed")]
    StatementClosed {
        /// Server-side name of the statement
        name: String,
    },
}

impl Error {
    /// Returns true if the error indicates the connection is broken and cannot be reused.
    pub fn is_connection_broken(&self) -> bool {
        match self {
            Error::Io(_) | Error::Protocol(_) => true,
            Error::Server(fields) => {
                // FATAL and PANIC errors indicate connection is broken
                matches!(fields.severity.as_deref(), Some("FATAL") | Some("PANIC"))
            }
            _ => false,
        }
    }

    /// Returns true if the error is a caller contract violation rather than a runtime failure.
    ///
    /// Usage faults are not worth retrying: the same call will fail the same way.
    pub fn is_usage_fault(&self) -> bool {
        matches!(
            self,
            Error::ParameterAlreadyBound { .. }
                | Error::StatementClosed { .. }
                | Error::InvalidUsage(_)
        )
    }

    /// Get the SQLSTATE code if this is a server error.
    pub fn sqlstate(&self) -> Option<&str> {
        match self {
            Error::Server(fields) => fields.code.as_deref(),
            _ => None,
        }
    }
}
