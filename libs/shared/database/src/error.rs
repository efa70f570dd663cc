use thiserror::Error;

/// Outcome of a store call that did not produce a record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Record not found")]
    NotFound,

    /// A conditional write found the record in the wrong state.
    #[error("Precondition failed")]
    Conflict,

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl From<anyhow::Error> for StoreError {
    fn from(err: anyhow::Error) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Unavailable(format!("Failed to parse record: {}", err))
    }
}
