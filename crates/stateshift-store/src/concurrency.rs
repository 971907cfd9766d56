//! Tag preconditions shared by every backend.

use crate::error::StoreError;

/// Check a write against the tag currently stored at the key.
pub(crate) fn check_write(
    record_type: &str,
    key: &str,
    expected: Option<&str>,
    current: Option<&str>,
) -> Result<(), StoreError> {
    match (expected, current) {
        (None, None) => Ok(()),
        (None, Some(_)) => Err(StoreError::AlreadyExists {
            record_type: record_type.to_string(),
            key: key.to_string(),
        }),
        (Some(expected), Some(current)) if expected == current => Ok(()),
        (Some(expected), current) => Err(conflict(record_type, key, expected, current)),
    }
}

/// Check a clear against the tag currently stored at the key.
///
/// An absent record satisfies any expectation.
pub(crate) fn check_clear(
    record_type: &str,
    key: &str,
    expected: Option<&str>,
    current: Option<&str>,
) -> Result<(), StoreError> {
    match (expected, current) {
        (Some(expected), Some(current)) if expected != current => {
            Err(conflict(record_type, key, expected, Some(current)))
        }
        _ => Ok(()),
    }
}

fn conflict(record_type: &str, key: &str, expected: &str, actual: Option<&str>) -> StoreError {
    StoreError::Conflict {
        record_type: record_type.to_string(),
        key: key.to_string(),
        expected: Some(expected.to_string()),
        actual: actual.map(str::to_string),
    }
}
