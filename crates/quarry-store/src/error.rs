//! Error types for the persistence layer.

use thiserror::Error;

/// A stored record could not be converted to or from its entity.
///
/// Always fatal to the single operation that produced it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    /// A required attribute is absent from the record.
    #[error("missing attribute: {0}")]
    MissingAttribute(String),

    /// An attribute is present but holds the wrong store type.
    #[error("attribute {name} has wrong type: expected {expected}")]
    WrongType { name: String, expected: &'static str },

    /// A value has no attribute representation.
    #[error("unsupported value for {name}: {kind}")]
    UnsupportedValue { name: String, kind: String },

    /// An attribute has the right type but unparseable contents.
    #[error("malformed attribute {name}: {message}")]
    Malformed { name: String, message: String },

    /// A job type descriptor did not resolve to a known job implementation.
    #[error("unresolved job type: {0}")]
    UnresolvedJobType(String),
}

/// Errors surfaced by the repository and the backing-store seam.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Rejected before any request was issued.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Record conversion failed.
    #[error("record error: {0}")]
    Record(#[from] RecordError),

    /// The table does not exist (or is not yet visible to the store).
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// Non-success response from the backing store.
    #[error("{operation} failed on {table}{}: {message}", match code {
        Some(code) => format!(" ({})", code),
        None => String::new(),
    })]
    Service {
        /// The store operation that failed (`PutItem`, `Scan`, ...).
        operation: &'static str,
        /// Table the request targeted.
        table: String,
        /// Service error code, when the store returned one.
        code: Option<String>,
        /// Rendered error with its source chain.
        message: String,
    },

    /// Gave up waiting for a table to become active.
    #[error("timed out waiting for table {0} to become active")]
    Timeout(String),
}

impl StoreError {
    /// Build a service fault for `operation` against `table`.
    pub fn service(
        operation: &'static str,
        table: impl Into<String>,
        code: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Service {
            operation,
            table: table.into(),
            code,
            message: message.into(),
        }
    }

    /// Whether a retry by the caller could plausibly succeed.
    ///
    /// Covers the startup race where a freshly created table is not yet
    /// visible, and throttling or server-side faults.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::TableNotFound(_) => true,
            StoreError::Service { code, .. } => matches!(
                code.as_deref(),
                Some(
                    "ProvisionedThroughputExceededException"
                        | "ThrottlingException"
                        | "RequestLimitExceeded"
                        | "InternalServerError"
                        | "ServiceUnavailable"
                )
            ),
            _ => false,
        }
    }
}
