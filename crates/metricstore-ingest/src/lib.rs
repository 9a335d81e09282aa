//! Turns line-protocol-like NATS messages into [`metricstore_core::MemoryStore`] writes.

pub mod mapping;
pub mod parser;
pub mod subscriber;

pub use mapping::TagMapping;
pub use parser::{ParseError, ParsedLine};
pub use subscriber::{run, SubscriptionConfig};
