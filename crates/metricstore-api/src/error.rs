use thiserror::Error;

/// Request-level errors, returned instead of a response rather than
/// embedded per-query. Per-selector failures go through
/// [`crate::types::ApiMetricData::error`] instead.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("invalid time range: from ({0}) > to ({1})")]
    InvalidTimeRange(i64, i64),

    #[error("forAllNodes requires a non-empty cluster")]
    EmptyCluster,
}

pub type Result<T> = std::result::Result<T, Error>;
