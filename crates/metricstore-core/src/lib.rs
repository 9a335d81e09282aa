//! Core in-memory data model: the selector tree, append-only sample
//! buffers, the metric registry, and the LTTB downsampler. Every other
//! crate in the workspace builds on top of [`MemoryStore`].

pub mod buffer;
pub mod downsample;
pub mod error;
pub mod level;
pub mod node_provider;
pub mod registry;
pub mod selector;
pub mod store;
pub mod value;

pub use buffer::{Buffer, BufferChain, BUFFER_CAPACITY};
pub use downsample::{lttb, resolve_resolution, Point};
pub use error::{Error, Result};
pub use level::Level;
pub use node_provider::{NoExemptions, NodeProvider};
pub use registry::{Aggregation, MetricConfig, MetricRegistry, Scope};
pub use selector::Selector;
pub use store::{MemoryStore, ReadResult, Sample};
pub use value::MetricValue;
