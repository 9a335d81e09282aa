use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while loading or validating a configuration file.
///
/// Every variant here corresponds to a fatal startup condition: the binary
/// is expected to log the error and exit non-zero rather than attempt to
/// run with a partially-valid configuration.
#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path} as JSON: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("checkpoints.interval: {0}")]
    InvalidCheckpointInterval(humantime::DurationError),

    #[error("archive.interval: {0}")]
    InvalidArchiveInterval(humantime::DurationError),

    #[error("retention-in-memory: {0}")]
    InvalidRetention(humantime::DurationError),

    #[error("cluster-retention[{cluster}]: {source}")]
    InvalidClusterRetention {
        cluster: String,
        #[source]
        source: humantime::DurationError,
    },

    #[error("checkpoints.file-format must be \"json\" or \"avro\", got {0:?}")]
    UnknownFileFormat(String),

    #[error("memory-cap must be a positive number of gigabytes")]
    InvalidMemoryCap,

    #[error("nats-subscriptions[{0}].subscribe-to must not be empty")]
    EmptySubject(usize),

    #[error("metrics.{metric}: {source}")]
    InvalidAggregation {
        metric: String,
        #[source]
        source: metricstore_core::Error,
    },

    #[error("metrics.{metric}.scope: unknown scope {scope:?}")]
    InvalidScope { metric: String, scope: String },
}

pub type Result<T> = std::result::Result<T, Error>;
