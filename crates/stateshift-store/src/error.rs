use thiserror::Error;

/// Errors reported by a [`Backend`](crate::Backend).
///
/// The two concurrency variants are part of the backend contract: callers
/// match on them to tell "someone else wrote first" apart from plain I/O
/// trouble.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The expected tag did not match the record currently stored.
    #[error("tag mismatch on {record_type}/{key}: expected {expected:?}, found {actual:?}")]
    Conflict {
        record_type: String,
        key: String,
        expected: Option<String>,
        actual: Option<String>,
    },

    /// A fresh insert (no expected tag) hit an existing record.
    #[error("record {record_type}/{key} already exists")]
    AlreadyExists { record_type: String, key: String },

    /// The backend could not be reached or is temporarily busy.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The backend refused the record payload.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// Any other backend failure.
    #[error("backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match e.sqlite_error_code() {
            Some(rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked) => {
                Self::Unavailable(e.to_string())
            }
            _ => Self::Backend(e.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(e: tokio::task::JoinError) -> Self {
        Self::Unavailable(format!("storage worker stopped: {e}"))
    }
}
