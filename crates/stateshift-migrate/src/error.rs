use stateshift_store::StoreError;
use thiserror::Error;

use crate::migrator::MigrationStatistics;
use crate::tag::MalformedTagError;

/// Errors surfaced by [`MigrationProxy`](crate::MigrationProxy) operations.
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The caller handed back a tag the proxy never produced.
    #[error(transparent)]
    MalformedTag(#[from] MalformedTagError),

    /// A backend rejected the call. Conflicts arrive here unchanged.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// At least one side of a clear failed. Both sides were attempted.
    #[error("clear failed ({})", clear_summary(.source_side, .destination_side))]
    Clear {
        source_side: Option<StoreError>,
        destination_side: Option<StoreError>,
    },
}

impl ProxyError {
    /// Whether the failure is an optimistic-concurrency conflict, meaning the
    /// caller should re-read before retrying.
    pub fn is_conflict(&self) -> bool {
        match self {
            Self::Store(e) => e.is_conflict() || e.is_already_exists(),
            Self::Clear {
                source_side,
                destination_side,
            } => source_side
                .iter()
                .chain(destination_side)
                .any(StoreError::is_conflict),
            Self::MalformedTag(_) => false,
        }
    }
}

fn clear_summary(source: &Option<StoreError>, destination: &Option<StoreError>) -> String {
    let side = |e: &Option<StoreError>| match e {
        Some(e) => e.to_string(),
        None => "ok".to_string(),
    };
    format!("source: {}; destination: {}", side(source), side(destination))
}

/// Construction-time failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{role} backend {name:?} is not registered")]
    UnknownBackend { role: &'static str, name: String },

    #[error("source and destination both name backend {0:?}")]
    SameBackend(String),

    #[error("backend {0:?} registered twice")]
    DuplicateBackend(String),

    #[error("invalid migrator setting: {0}")]
    InvalidSetting(String),
}

/// A bulk migration pass that could not finish.
#[derive(Debug, Error)]
pub enum MigrateError {
    /// Enumerating the source failed; `statistics` holds what was tallied
    /// before the scan broke.
    #[error("source enumeration failed after {statistics}: {source}")]
    Enumeration {
        statistics: MigrationStatistics,
        #[source]
        source: StoreError,
    },
}

impl MigrateError {
    /// Statistics accumulated before the pass stopped.
    pub fn statistics(&self) -> MigrationStatistics {
        match self {
            Self::Enumeration { statistics, .. } => *statistics,
        }
    }
}
