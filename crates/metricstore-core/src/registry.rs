//! The metric registry: the fixed, write-once mapping from metric name to
//! `(frequency, aggregation, offset)` that every [`crate::level::Level`]'s
//! `metrics` slice is indexed by.

use std::collections::HashMap;

use crate::error::{Error, Result};

/// How readings from multiple selectors at the same metric are combined
/// when a query resolves to more than one leaf (see
/// [`crate::store::MemoryStore::read`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Aggregation {
    /// Multiple matches are an error.
    None,
    /// Sum across matches.
    Sum,
    /// Sum across matches, then divide by the match count.
    Avg,
}

impl Aggregation {
    /// Parses the wire representation used in metric configuration
    /// (`""` means `None`).
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "" | "none" => Ok(Self::None),
            "sum" => Ok(Self::Sum),
            "avg" => Ok(Self::Avg),
            other => Err(Error::UnknownAggregationStrategy(other.to_owned())),
        }
    }
}

/// The tree depth at which a metric is natively produced. Not used by the
/// core write/read path, but validated by the ingestor and the query API's
/// `forAllNodes` fan-out against the selector depth they operate at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Scope {
    Node,
    Socket,
    Core,
    HwThread,
    Accelerator,
}

/// Static configuration for one metric name.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MetricConfig {
    pub frequency: i64,
    pub aggregation: Aggregation,
    #[serde(default)]
    pub scope: Option<Scope>,
    #[serde(default)]
    pub unit: Option<String>,
    /// Assigned by [`MetricRegistry::add`]; stable for the registry's lifetime.
    #[serde(skip)]
    pub offset: usize,
}

/// The process-wide, write-once table of known metrics.
///
/// Additions before the registry is frozen (first [`MemoryStore::write`]
/// for any selector — in practice, anything before `MemoryStore::new`
/// returns) keep the maximum declared frequency when a name recurs: a
/// metric's sampling interval only ever tightens as more config sources
/// are merged in, never loosens.
///
/// [`MemoryStore::write`]: crate::store::MemoryStore::write
#[derive(Debug, Clone, Default)]
pub struct MetricRegistry {
    by_name: HashMap<String, MetricConfig>,
    order: Vec<String>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `name`, or updates its frequency to the max of the
    /// existing and the new value if it was already registered. Returns the
    /// metric's offset.
    pub fn add(&mut self, name: &str, mut cfg: MetricConfig) -> usize {
        if let Some(existing) = self.by_name.get_mut(name) {
            existing.frequency = existing.frequency.max(cfg.frequency);
            existing.aggregation = cfg.aggregation;
            existing.scope = cfg.scope.or(existing.scope);
            existing.unit = cfg.unit.clone().or_else(|| existing.unit.clone());
            return existing.offset;
        }

        let offset = self.order.len();
        cfg.offset = offset;
        self.order.push(name.to_owned());
        self.by_name.insert(name.to_owned(), cfg);
        offset
    }

    pub fn get(&self, name: &str) -> Option<&MetricConfig> {
        self.by_name.get(name)
    }

    pub fn offset_of(&self, name: &str) -> Result<usize> {
        self.by_name
            .get(name)
            .map(|c| c.offset)
            .ok_or_else(|| Error::UnknownMetric(name.to_owned()))
    }

    pub fn name_at(&self, offset: usize) -> Option<&str> {
        self.order.get(offset).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(freq: i64, agg: Aggregation) -> MetricConfig {
        MetricConfig {
            frequency: freq,
            aggregation: agg,
            scope: None,
            unit: None,
            offset: 0,
        }
    }

    #[test]
    fn offsets_are_stable_and_unique() {
        let mut reg = MetricRegistry::new();
        let a = reg.add("flops", cfg(10, Aggregation::None));
        let b = reg.add("power", cfg(10, Aggregation::Sum));
        assert_eq!(a, 0);
        assert_eq!(b, 1);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn re_adding_keeps_max_frequency() {
        let mut reg = MetricRegistry::new();
        reg.add("flops", cfg(10, Aggregation::None));
        reg.add("flops", cfg(60, Aggregation::None));
        assert_eq!(reg.get("flops").unwrap().frequency, 60);

        reg.add("flops", cfg(5, Aggregation::None));
        assert_eq!(
            reg.get("flops").unwrap().frequency,
            60,
            "frequency must never decrease"
        );
    }

    #[test]
    fn aggregation_parse_matches_seed_scenario_5() {
        assert_eq!(Aggregation::parse("").unwrap(), Aggregation::None);
        assert_eq!(Aggregation::parse("sum").unwrap(), Aggregation::Sum);
        assert_eq!(Aggregation::parse("avg").unwrap(), Aggregation::Avg);
        assert!(Aggregation::parse("x").is_err());
    }
}
