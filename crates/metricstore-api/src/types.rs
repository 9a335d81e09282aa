//! Request and response shapes for `POST /query`.

use metricstore_core::MetricValue;
use serde::{Deserialize, Serialize};

/// One requested metric at one host, with optional type/sub-type expansion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuerySpec {
    pub metric: String,
    pub host: String,
    #[serde(default)]
    pub r#type: Option<String>,
    #[serde(default)]
    pub type_ids: Vec<String>,
    #[serde(default)]
    pub sub_type: Option<String>,
    #[serde(default)]
    pub sub_type_ids: Vec<String>,
    #[serde(default)]
    pub scale_factor: f32,
    #[serde(default)]
    pub aggregate: bool,
    #[serde(default)]
    pub resolution: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiQueryRequest {
    pub cluster: String,
    #[serde(default)]
    pub queries: Vec<QuerySpec>,
    #[serde(default)]
    pub for_all_nodes: Vec<String>,
    pub from: i64,
    pub to: i64,
    #[serde(default)]
    pub with_stats: bool,
    #[serde(default = "default_true")]
    pub with_data: bool,
    #[serde(default)]
    pub with_padding: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Stats {
    pub min: f32,
    pub avg: f32,
    pub max: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiMetricData {
    pub metric: String,
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<MetricValue>>,
    pub from: i64,
    pub to: i64,
    pub resolution: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<Stats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiQueryResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queries: Option<Vec<QuerySpec>>,
    pub results: Vec<Vec<ApiMetricData>>,
}
