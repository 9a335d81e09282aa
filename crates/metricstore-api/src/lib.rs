//! The query API: request expansion, hierarchical aggregation fan-out, and
//! response post-processing (scaling, padding, stats) in front of
//! [`metricstore_core::MemoryStore`].

mod error;
mod query;
mod stats;
mod types;

pub use error::{Error, Result};
pub use query::handle;
pub use types::{ApiMetricData, ApiQueryRequest, ApiQueryResponse, QuerySpec, Stats};
