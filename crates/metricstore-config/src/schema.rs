//! The as-written JSON configuration shape. Durations and the checkpoint
//! format are left as strings here; [`crate::resolve`] parses and
//! validates them into [`crate::Config`].

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawConfig {
    #[serde(default)]
    pub num_workers: Option<usize>,
    pub checkpoints: RawCheckpoints,
    pub archive: RawArchive,
    pub retention_in_memory: String,
    pub memory_cap: i64,
    #[serde(default)]
    pub nats_subscriptions: Vec<RawNatsSubscription>,
    /// Per-cluster or per-subcluster retention override. The shortest
    /// window among these (and the default) drives the sweep's tick rate.
    #[serde(default)]
    pub cluster_retention: BTreeMap<String, String>,
    /// Static metric definitions, keyed by name. Registered into the
    /// in-memory store's registry at startup, before anything is written.
    #[serde(default)]
    pub metrics: BTreeMap<String, RawMetricConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawMetricConfig {
    pub frequency: i64,
    #[serde(default)]
    pub aggregation: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawCheckpoints {
    #[serde(default)]
    pub file_format: Option<String>,
    pub interval: String,
    pub directory: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawArchive {
    pub interval: String,
    pub directory: PathBuf,
    #[serde(default)]
    pub delete_instead: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RawNatsSubscription {
    pub subscribe_to: String,
    #[serde(default)]
    pub cluster_tag: Option<String>,
}
