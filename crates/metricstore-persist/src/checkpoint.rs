//! The row/recursive JSON checkpoint format: one file per `(cluster, host)`
//! per checkpoint window, mirroring the shape of the in-memory subtree.

use std::collections::BTreeMap;

use metricstore_core::{Level, MetricValue};
use serde::{Deserialize, Serialize};

/// One contiguous run of samples for a metric, clipped to a checkpoint
/// window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSegment {
    pub start: i64,
    pub frequency: i64,
    pub data: Vec<MetricValue>,
}

/// One node of the subtree captured by a [`CheckpointFile`]: the metrics
/// written at that exact node, plus nested children by path label.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckpointNode {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metrics: BTreeMap<String, MetricSegment>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub children: BTreeMap<String, CheckpointNode>,
}

impl CheckpointNode {
    fn is_empty(&self) -> bool {
        self.metrics.is_empty() && self.children.is_empty()
    }
}

/// The on-disk row-JSON checkpoint for one `(cluster, host)` pair and one
/// time window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointFile {
    pub cluster: String,
    pub host: String,
    pub window_from: i64,
    pub window_to: i64,
    pub root: CheckpointNode,
}

/// Captures every non-archived segment overlapping `[from, to]` under
/// `host_node`, recursively. Returns `None` if the subtree has nothing new
/// to checkpoint in this window.
pub fn capture(
    cluster: &str,
    host: &str,
    host_node: &Level,
    metric_names: &[String],
    from: i64,
    to: i64,
) -> Option<CheckpointFile> {
    let root = capture_node(host_node, metric_names, from, to)?;
    Some(CheckpointFile {
        cluster: cluster.to_owned(),
        host: host.to_owned(),
        window_from: from,
        window_to: to,
        root,
    })
}

fn capture_node(
    level: &Level,
    metric_names: &[String],
    from: i64,
    to: i64,
) -> Option<CheckpointNode> {
    let mut metrics = BTreeMap::new();

    for (offset, name) in metric_names.iter().enumerate() {
        level.with_chain(offset, |chain| {
            let Some(chain) = chain else { return };
            let mut collected: Vec<MetricValue> = Vec::new();
            let mut seg_start = None;
            let mut frequency = 0;
            chain.iter_from_to(from, to, |seg| {
                if seg.archived {
                    return;
                }
                let seg_end = seg.start + (seg.data.len() as i64 - 1) * seg.frequency;
                let clip_from = seg.start.max(from);
                let clip_to = seg_end.min(to);
                if clip_from > clip_to {
                    return;
                }
                frequency = seg.frequency;
                if seg_start.is_none() {
                    seg_start = Some(clip_from);
                }
                let start_idx = ((clip_from - seg.start) / seg.frequency) as usize;
                let end_idx = ((clip_to - seg.start) / seg.frequency) as usize;
                collected.extend_from_slice(&seg.data[start_idx..=end_idx]);
            });
            if let Some(start) = seg_start {
                metrics.insert(
                    name.clone(),
                    MetricSegment {
                        start,
                        frequency,
                        data: collected,
                    },
                );
            }
        });
    }

    let mut children = BTreeMap::new();
    for (label, child) in level.children() {
        if let Some(node) = capture_node(&child, metric_names, from, to) {
            children.insert(label, node);
        }
    }

    let node = CheckpointNode { metrics, children };
    if node.is_empty() {
        None
    } else {
        Some(node)
    }
}

/// Marks every segment overlapping `[from, to]` archived, recursively. Run
/// after a [`CheckpointFile`] capturing the same window has been durably
/// written to disk.
pub fn mark_archived(level: &Level, metric_names: &[String], from: i64, to: i64) {
    for offset in 0..metric_names.len() {
        level.with_chain_mut(offset, |chain| {
            for seg in chain.iter_segments_mut() {
                let seg_end = seg.start + (seg.data.len() as i64 - 1) * seg.frequency;
                if seg_end >= from && seg.start <= to {
                    seg.archived = true;
                }
            }
        });
    }
    for (_, child) in level.children() {
        mark_archived(&child, metric_names, from, to);
    }
}

/// Replays a loaded [`CheckpointFile`] into the tree, recreating the host's
/// subtree via `find_or_create` and linking each segment onto the existing
/// chain head.
pub fn apply(
    root: &std::sync::Arc<Level>,
    file: &CheckpointFile,
    metric_names: &[String],
    num_metrics: usize,
) -> metricstore_core::Result<()> {
    let host_path = [file.cluster.clone(), file.host.clone()];
    let host_node = root.find_or_create(&host_path, num_metrics);
    apply_node(&host_node, &file.root, metric_names, num_metrics)
}

fn apply_node(
    level: &std::sync::Arc<Level>,
    node: &CheckpointNode,
    metric_names: &[String],
    num_metrics: usize,
) -> metricstore_core::Result<()> {
    for (name, segment) in &node.metrics {
        let Some(offset) = metric_names.iter().position(|n| n == name) else {
            continue;
        };
        level.with_chain_mut(offset, |chain| {
            chain.append_archived_segment(metricstore_core::Buffer {
                start: segment.start,
                frequency: segment.frequency,
                data: segment.data.clone(),
                archived: true,
                closed: false,
            })
        })?;
    }
    for (label, child) in &node.children {
        let child_node = level.find_or_create(std::slice::from_ref(label), num_metrics);
        apply_node(&child_node, child, metric_names, num_metrics)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use metricstore_core::{Level, MemoryStore, MetricConfig, MetricRegistry, Sample, Selector};
    use std::sync::Arc;

    fn make_store() -> (Arc<MemoryStore>, Vec<String>) {
        let mut reg = MetricRegistry::new();
        reg.add(
            "flops",
            MetricConfig {
                frequency: 10,
                aggregation: metricstore_core::Aggregation::None,
                scope: None,
                unit: None,
                offset: 0,
            },
        );
        let names: Vec<String> = reg.names().map(str::to_owned).collect();
        (Arc::new(MemoryStore::new(Arc::new(reg), None)), names)
    }

    #[test]
    fn capture_then_apply_round_trips() {
        let (store, names) = make_store();
        let sel = Selector::new(["fritz", "n1"]);
        store
            .write(
                &sel,
                100,
                &[Sample {
                    name: "flops".into(),
                    value: MetricValue::new(1.0),
                }],
            )
            .unwrap();
        store
            .write(
                &sel,
                110,
                &[Sample {
                    name: "flops".into(),
                    value: MetricValue::new(2.0),
                }],
            )
            .unwrap();

        let host_node = store.root().find(sel.parts()).unwrap();
        let file = capture("fritz", "n1", &host_node, &names, 0, 200).unwrap();
        assert_eq!(file.root.metrics["flops"].data.len(), 2);

        let fresh_root = Level::root(names.len());
        apply(&fresh_root, &file, &names, names.len()).unwrap();
        let loaded_host = fresh_root.find(sel.parts()).unwrap();
        let (data, _, _) = loaded_host.read(0, 100, 110).unwrap();
        assert_eq!(data, vec![MetricValue::new(1.0), MetricValue::new(2.0)]);
    }

    #[test]
    fn capture_omits_fully_archived_metrics() {
        let (store, names) = make_store();
        let sel = Selector::new(["fritz", "n1"]);
        store
            .write(
                &sel,
                100,
                &[Sample {
                    name: "flops".into(),
                    value: MetricValue::new(1.0),
                }],
            )
            .unwrap();
        let host_node = store.root().find(sel.parts()).unwrap();
        mark_archived(&host_node, &names, 0, 200);

        assert!(capture("fritz", "n1", &host_node, &names, 0, 200).is_none());
    }
}
