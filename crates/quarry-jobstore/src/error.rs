//! Error types for the job store.

use quarry_store::{RecordError, StoreError};
use thiserror::Error;

/// Scheduler-level persistence errors.
#[derive(Debug, Error)]
pub enum JobStoreError {
    /// Repository or backend fault, carrying the underlying cause.
    #[error("persistence error: {0}")]
    Store(#[from] StoreError),

    /// An object with the same key exists and replacement was not requested.
    #[error("object already exists: {0}")]
    ObjectAlreadyExists(String),

    /// A trigger referenced a job that is not stored.
    #[error("job not found: {0}")]
    JobNotFound(String),

    /// A calendar is still referenced by at least one trigger.
    #[error("calendar {calendar} is referenced by trigger {trigger}")]
    CalendarInUse { calendar: String, trigger: String },

    /// Rejected before touching the store.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A compare-and-swap kept losing to concurrent writers.
    #[error("gave up updating {0} after repeated conflicts")]
    Contention(String),
}

impl From<RecordError> for JobStoreError {
    fn from(err: RecordError) -> Self {
        JobStoreError::Store(StoreError::Record(err))
    }
}
