//! Configuration schema, file loading, and validation for the metricstore
//! binary: everything under `num-workers`, `checkpoints.*`, `archive.*`,
//! `retention-in-memory`, `memory-cap`, and `nats-subscriptions`.

mod error;
mod load;
mod resolve;
mod schema;

pub use error::{Error, Result};
pub use load::load;
pub use resolve::{resolve, Config, NatsSubscription};
pub use schema::{RawArchive, RawCheckpoints, RawConfig, RawMetricConfig, RawNatsSubscription};
