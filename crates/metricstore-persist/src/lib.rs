//! Checkpointing, startup loading, and archival for the in-memory metric
//! tree: the three background components that make the store's data
//! durable across restarts without keeping everything resident forever.

pub mod archiver;
pub mod checkpoint;
pub mod checkpointer;
pub mod column;
pub mod error;
pub mod loader;

pub use archiver::{Archiver, ArchiverConfig};
pub use checkpoint::CheckpointFile;
pub use checkpointer::{Checkpointer, CheckpointerConfig, Format};
pub use error::{Error, Result};
pub use loader::{Loader, LoaderConfig};
