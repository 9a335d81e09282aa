use thiserror::Error;

/// Errors produced by the selector tree, buffers, and [`crate::store::MemoryStore`].
#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum Error {
    #[error("write timestamp {ts} is older than the next expected slot {expected}")]
    TimestampTooOld { ts: i64, expected: i64 },

    #[error("unknown metric {0:?}")]
    UnknownMetric(String),

    #[error("no buffers found for the requested selector/metric")]
    MetricOrHostNotFound,

    #[error(
        "hierarchical aggregation saw children with misaligned ranges for metric {metric:?}"
    )]
    DataDoesNotAlign { metric: String },

    #[error("metric {0:?} has aggregation `none` but multiple selectors matched")]
    InvalidAggregation(String),

    #[error("invalid time range: from ({from}) > to ({to})")]
    InvalidTimeRange { from: i64, to: i64 },

    #[error("unknown aggregation strategy {0:?}")]
    UnknownAggregationStrategy(String),
}

pub type Result<T> = std::result::Result<T, Error>;
