//! Expands an [`ApiQueryRequest`] into selector-level reads and assembles
//! the response, applying stats, scaling, padding, and data-stripping.

use itertools::Itertools;
use metricstore_core::{MemoryStore, MetricValue, Selector};

use crate::error::{Error, Result};
use crate::stats;
use crate::types::{ApiMetricData, ApiQueryRequest, ApiQueryResponse, QuerySpec};

pub fn handle(store: &MemoryStore, request: &ApiQueryRequest) -> Result<ApiQueryResponse> {
    if request.from > request.to {
        return Err(Error::InvalidTimeRange(request.from, request.to));
    }

    let mut queries = request.queries.clone();
    if !request.for_all_nodes.is_empty() {
        if request.cluster.is_empty() {
            return Err(Error::EmptyCluster);
        }
        let hosts = store
            .list_children(&Selector::new([request.cluster.clone()]))
            .unwrap_or_default();
        for metric in &request.for_all_nodes {
            for host in &hosts {
                queries.push(QuerySpec {
                    metric: metric.clone(),
                    host: host.clone(),
                    r#type: None,
                    type_ids: Vec::new(),
                    sub_type: None,
                    sub_type_ids: Vec::new(),
                    scale_factor: 0.0,
                    aggregate: true,
                    resolution: 0,
                });
            }
        }
    }

    let results = queries
        .iter()
        .map(|query| run_query(store, &request.cluster, query, request))
        .collect();

    Ok(ApiQueryResponse {
        queries: Some(queries),
        results,
    })
}

fn run_query(
    store: &MemoryStore,
    cluster: &str,
    query: &QuerySpec,
    request: &ApiQueryRequest,
) -> Vec<ApiMetricData> {
    selectors_for(cluster, query)
        .into_iter()
        .map(|selector| {
            read_one(store, &selector, query, request)
        })
        .collect()
}

/// Expands one query into the selector(s) it reads. Aggregated (or
/// type-less) queries resolve to a single selector at the host node —
/// [`MemoryStore::read`] already aggregates across every descendant leaf.
/// Non-aggregated, typed queries cross `type_ids × sub_type_ids` into one
/// leaf selector per combination.
fn selectors_for(cluster: &str, query: &QuerySpec) -> Vec<Selector> {
    let base = Selector::new([cluster.to_owned(), query.host.clone()]);
    if query.aggregate || query.r#type.is_none() {
        return vec![base];
    }
    if query.type_ids.is_empty() {
        return vec![base];
    }
    if query.sub_type_ids.is_empty() {
        return query
            .type_ids
            .iter()
            .map(|type_id| base.child(type_id.clone()))
            .collect();
    }
    query
        .type_ids
        .iter()
        .cartesian_product(query.sub_type_ids.iter())
        .map(|(type_id, sub_type_id)| base.child(type_id.clone()).child(sub_type_id.clone()))
        .collect()
}

fn read_one(
    store: &MemoryStore,
    selector: &Selector,
    query: &QuerySpec,
    request: &ApiQueryRequest,
) -> ApiMetricData {
    let frequency = store.registry().get(&query.metric).map(|cfg| cfg.frequency);

    match store.read(selector, &query.metric, request.from, request.to, query.resolution) {
        Ok(mut result) => {
            if query.scale_factor != 0.0 && query.scale_factor != 1.0 {
                for value in &mut result.data {
                    *value = value.scale(query.scale_factor);
                }
            }

            if request.with_padding {
                if let Some(frequency) = frequency {
                    if frequency > 0 && result.actual_from > request.from {
                        let pad = ((result.actual_from - request.from) / frequency) as usize;
                        let mut padded = vec![MetricValue::NAN; pad];
                        padded.extend(result.data);
                        result.data = padded;
                        result.actual_from = request.from;
                    }
                }
            }

            let computed_stats = if request.with_stats {
                stats::compute(&result.data).map(|s| {
                    if query.scale_factor != 0.0 && query.scale_factor != 1.0 {
                        stats::scale(s, query.scale_factor)
                    } else {
                        s
                    }
                })
            } else {
                None
            };

            ApiMetricData {
                metric: query.metric.clone(),
                host: query.host.clone(),
                from: result.actual_from,
                to: result.actual_to,
                resolution: result.actual_resolution,
                data: request.with_data.then_some(result.data),
                stats: computed_stats,
                error: None,
            }
        }
        Err(err) => ApiMetricData {
            metric: query.metric.clone(),
            host: query.host.clone(),
            data: None,
            from: request.from,
            to: request.to,
            resolution: 0,
            stats: None,
            error: Some(err.to_string()),
        },
    }
}
