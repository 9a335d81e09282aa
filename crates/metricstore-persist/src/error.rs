use thiserror::Error;

/// Errors from checkpointing, loading, and archiving.
#[derive(Error, Debug)]
pub enum Error {
    #[error("i/o error at {path}: {source}")]
    Io {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode checkpoint: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("failed to decode checkpoint at {path}: {source}")]
    Decode {
        path: std::path::PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("zip archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error(transparent)]
    Store(#[from] metricstore_core::Error),

    /// Internal-only: raised by the loader/archiver when a scan finds
    /// nothing new to act on. Never surfaced to callers outside this crate.
    #[error("no new archive data")]
    NoNewArchiveData,
}

pub type Result<T> = std::result::Result<T, Error>;
