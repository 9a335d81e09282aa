//! Turns a [`RawConfig`] into a validated, duration-typed [`Config`] the
//! binary can hand straight to the checkpointer, archiver, retention sweep,
//! and ingestor.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use metricstore_core::{Aggregation, MetricConfig, MetricRegistry, Scope};
use metricstore_persist::Format;

use crate::error::{Error, Result};
use crate::schema::RawConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub num_workers: usize,
    pub checkpoint_format: Format,
    pub checkpoint_interval: Duration,
    pub checkpoint_directory: PathBuf,
    pub archive_interval: Duration,
    pub archive_directory: PathBuf,
    pub archive_delete_instead: bool,
    pub retention_in_memory: Duration,
    pub memory_cap_gb: f64,
    pub nats_subscriptions: Vec<NatsSubscription>,
    pub cluster_retention: BTreeMap<String, Duration>,
    pub registry: MetricRegistry,
}

#[derive(Debug, Clone)]
pub struct NatsSubscription {
    pub subject: String,
    pub cluster_tag: Option<String>,
}

/// Caps `num-workers` the same way the checkpointer defaults it, so the two
/// stay in lockstep even when the config omits the field.
fn default_num_workers() -> usize {
    (num_cpus::get() / 2 + 1).min(10)
}

fn parse_scope(metric: &str, raw: &str) -> Result<Scope> {
    match raw {
        "node" => Ok(Scope::Node),
        "socket" => Ok(Scope::Socket),
        "core" => Ok(Scope::Core),
        "hwthread" => Ok(Scope::HwThread),
        "accelerator" => Ok(Scope::Accelerator),
        other => Err(Error::InvalidScope {
            metric: metric.to_owned(),
            scope: other.to_owned(),
        }),
    }
}

pub fn resolve(raw: RawConfig) -> Result<Config> {
    let checkpoint_format = match raw.checkpoints.file_format.as_deref() {
        None | Some("json") => Format::Json,
        Some("avro") => Format::ColumnBlock,
        Some(other) => return Err(Error::UnknownFileFormat(other.to_owned())),
    };

    let checkpoint_interval = humantime::parse_duration(&raw.checkpoints.interval)
        .map_err(Error::InvalidCheckpointInterval)?;
    let archive_interval =
        humantime::parse_duration(&raw.archive.interval).map_err(Error::InvalidArchiveInterval)?;
    let retention_in_memory =
        humantime::parse_duration(&raw.retention_in_memory).map_err(Error::InvalidRetention)?;

    if raw.memory_cap <= 0 {
        return Err(Error::InvalidMemoryCap);
    }

    let mut cluster_retention = BTreeMap::new();
    for (cluster, duration_str) in raw.cluster_retention {
        let duration = humantime::parse_duration(&duration_str).map_err(|source| {
            Error::InvalidClusterRetention {
                cluster: cluster.clone(),
                source,
            }
        })?;
        cluster_retention.insert(cluster, duration);
    }

    let mut nats_subscriptions = Vec::with_capacity(raw.nats_subscriptions.len());
    for (i, sub) in raw.nats_subscriptions.into_iter().enumerate() {
        if sub.subscribe_to.trim().is_empty() {
            return Err(Error::EmptySubject(i));
        }
        nats_subscriptions.push(NatsSubscription {
            subject: sub.subscribe_to,
            cluster_tag: sub.cluster_tag,
        });
    }

    let mut registry = MetricRegistry::new();
    for (name, metric) in raw.metrics {
        let aggregation =
            Aggregation::parse(&metric.aggregation).map_err(|source| Error::InvalidAggregation {
                metric: name.clone(),
                source,
            })?;
        let scope = metric
            .scope
            .map(|s| parse_scope(&name, &s))
            .transpose()?;
        registry.add(
            &name,
            MetricConfig {
                frequency: metric.frequency,
                aggregation,
                scope,
                unit: metric.unit,
                offset: 0,
            },
        );
    }

    Ok(Config {
        num_workers: raw.num_workers.unwrap_or_else(default_num_workers),
        checkpoint_format,
        checkpoint_interval,
        checkpoint_directory: raw.checkpoints.directory,
        archive_interval,
        archive_directory: raw.archive.directory,
        archive_delete_instead: raw.archive.delete_instead,
        retention_in_memory,
        memory_cap_gb: raw.memory_cap as f64,
        nats_subscriptions,
        cluster_retention,
        registry,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{RawArchive, RawCheckpoints, RawMetricConfig, RawNatsSubscription};

    fn minimal_raw() -> RawConfig {
        RawConfig {
            num_workers: None,
            checkpoints: RawCheckpoints {
                file_format: None,
                interval: "30s".to_owned(),
                directory: PathBuf::from("/var/lib/metricstore/checkpoints"),
            },
            archive: RawArchive {
                interval: "1h".to_owned(),
                directory: PathBuf::from("/var/lib/metricstore/archive"),
                delete_instead: false,
            },
            retention_in_memory: "24h".to_owned(),
            memory_cap: 64,
            nats_subscriptions: Vec::new(),
            cluster_retention: BTreeMap::new(),
            metrics: BTreeMap::new(),
        }
    }

    #[test]
    fn minimal_config_resolves_with_sane_defaults() {
        let cfg = resolve(minimal_raw()).unwrap();
        assert_eq!(cfg.checkpoint_format, Format::Json);
        assert_eq!(cfg.checkpoint_interval, Duration::from_secs(30));
        assert_eq!(cfg.archive_interval, Duration::from_secs(3600));
        assert_eq!(cfg.retention_in_memory, Duration::from_secs(86400));
        assert_eq!(cfg.memory_cap_gb, 64.0);
        assert_eq!(cfg.num_workers, default_num_workers());
    }

    #[test]
    fn unknown_file_format_is_rejected() {
        let mut raw = minimal_raw();
        raw.checkpoints.file_format = Some("protobuf".to_owned());
        assert!(matches!(resolve(raw), Err(Error::UnknownFileFormat(f)) if f == "protobuf"));
    }

    #[test]
    fn zero_memory_cap_is_rejected() {
        let mut raw = minimal_raw();
        raw.memory_cap = 0;
        assert!(matches!(resolve(raw), Err(Error::InvalidMemoryCap)));
    }

    #[test]
    fn cluster_retention_overrides_parse_independently() {
        let mut raw = minimal_raw();
        raw.cluster_retention.insert("fritz".to_owned(), "1h".to_owned());
        let cfg = resolve(raw).unwrap();
        assert_eq!(cfg.cluster_retention["fritz"], Duration::from_secs(3600));
    }

    #[test]
    fn empty_subject_is_rejected() {
        let mut raw = minimal_raw();
        raw.nats_subscriptions.push(RawNatsSubscription {
            subscribe_to: "  ".to_owned(),
            cluster_tag: None,
        });
        assert!(matches!(resolve(raw), Err(Error::EmptySubject(0))));
    }

    #[test]
    fn metric_definitions_populate_the_registry() {
        let mut raw = minimal_raw();
        raw.metrics.insert(
            "flops".to_owned(),
            RawMetricConfig {
                frequency: 10,
                aggregation: "sum".to_owned(),
                scope: Some("node".to_owned()),
                unit: Some("flop/s".to_owned()),
            },
        );
        let cfg = resolve(raw).unwrap();
        let metric = cfg.registry.get("flops").unwrap();
        assert_eq!(metric.frequency, 10);
        assert_eq!(metric.aggregation, Aggregation::Sum);
        assert_eq!(metric.scope, Some(Scope::Node));
    }

    #[test]
    fn unknown_scope_is_rejected() {
        let mut raw = minimal_raw();
        raw.metrics.insert(
            "flops".to_owned(),
            RawMetricConfig {
                frequency: 10,
                aggregation: "sum".to_owned(),
                scope: Some("gpu".to_owned()),
                unit: None,
            },
        );
        assert!(matches!(resolve(raw), Err(Error::InvalidScope { .. })));
    }
}
