//! The in-memory metric store: the selector tree plus the read-side
//! aggregation and downsampling pipeline in front of it.

use std::sync::Arc;

use crate::downsample::{lttb, resolve_resolution, Point};
use crate::error::{Error, Result};
use crate::level::Level;
use crate::node_provider::NodeProvider;
use crate::registry::{Aggregation, MetricRegistry};
use crate::selector::Selector;
use crate::value::MetricValue;

/// One `(name, value)` pair to write at a given selector and timestamp.
#[derive(Debug, Clone)]
pub struct Sample {
    pub name: String,
    pub value: MetricValue,
}

/// The result of [`MemoryStore::read`].
#[derive(Debug, Clone, PartialEq)]
pub struct ReadResult {
    pub data: Vec<MetricValue>,
    pub actual_from: i64,
    pub actual_to: i64,
    /// The time resolution the returned `data` was actually sampled at: the
    /// smallest multiple of the metric's native frequency that is at least
    /// `want_resolution`, per [`crate::downsample::resolve_resolution`].
    /// Equals the native frequency when downsampling was disabled or the
    /// request already asked for native resolution or finer.
    pub actual_resolution: i64,
}

pub struct MemoryStore {
    root: Arc<Level>,
    registry: Arc<MetricRegistry>,
    node_provider: Option<Arc<dyn NodeProvider>>,
}

impl MemoryStore {
    pub fn new(registry: Arc<MetricRegistry>, node_provider: Option<Arc<dyn NodeProvider>>) -> Self {
        let root = Level::root(registry.len());
        Self {
            root,
            registry,
            node_provider,
        }
    }

    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }

    /// Resolves `selector` (creating intermediate nodes as needed) and
    /// appends every sample to its buffer.
    pub fn write(&self, selector: &Selector, ts: i64, samples: &[Sample]) -> Result<()> {
        let node = self.root.find_or_create(selector.parts(), self.registry.len());
        for sample in samples {
            let cfg = self
                .registry
                .get(&sample.name)
                .ok_or_else(|| Error::UnknownMetric(sample.name.clone()))?;
            node.write(cfg.offset, ts, sample.value, cfg.frequency)?;
        }
        Ok(())
    }

    /// Reads `metric` under `selector`, aggregating across every descendant
    /// leaf that has data for it, then downsampling to `want_resolution`
    /// points (0 disables downsampling).
    pub fn read(
        &self,
        selector: &Selector,
        metric: &str,
        from: i64,
        to: i64,
        want_resolution: usize,
    ) -> Result<ReadResult> {
        if from > to {
            return Err(Error::InvalidTimeRange { from, to });
        }
        let cfg = self
            .registry
            .get(metric)
            .ok_or_else(|| Error::UnknownMetric(metric.to_owned()))?;
        let offset = cfg.offset;

        let node = self
            .root
            .find(selector.parts())
            .ok_or(Error::MetricOrHostNotFound)?;

        let mut leaves = Vec::new();
        collect_buffers(&node, offset, &mut leaves);
        if leaves.is_empty() {
            return Err(Error::MetricOrHostNotFound);
        }

        if leaves.len() > 1 && cfg.aggregation == Aggregation::None {
            return Err(Error::InvalidAggregation(metric.to_owned()));
        }

        let mut reads = Vec::with_capacity(leaves.len());
        for leaf in &leaves {
            let (data, actual_from, actual_to) = leaf
                .read(offset, from, to)
                .expect("leaf came from collect_buffers, which only selects populated slots");
            reads.push((data, actual_from, actual_to));
        }

        let (_, actual_from, actual_to) = reads[0];
        for (data, f, t) in &reads {
            if *f != actual_from || *t != actual_to || data.len() != reads[0].0.len() {
                return Err(Error::DataDoesNotAlign {
                    metric: metric.to_owned(),
                });
            }
        }

        let combined = match cfg.aggregation {
            Aggregation::None => reads.into_iter().next().expect("checked non-empty").0,
            Aggregation::Sum => reduce(&reads, 1.0),
            Aggregation::Avg => reduce(&reads, 1.0 / leaves.len() as f32),
        };

        let points: Vec<Point> = combined
            .iter()
            .enumerate()
            .map(|(i, &value)| Point {
                ts: actual_from + i as i64 * cfg.frequency,
                value,
            })
            .collect();

        let resolution = resolve_resolution(want_resolution, cfg.frequency);
        let sampled = if want_resolution == 0 {
            points
        } else {
            lttb(&points, cfg.frequency, resolution)
        };

        Ok(ReadResult {
            data: sampled.into_iter().map(|p| p.value).collect(),
            actual_from,
            actual_to,
            actual_resolution: resolution,
        })
    }

    /// Prunes data older than `t`. `selector == None` applies at the cluster
    /// level, consulting the configured [`NodeProvider`] (if any) to exempt
    /// hosts that are still in active use.
    pub fn free(&self, selector: Option<&Selector>, t: i64) -> usize {
        match selector {
            Some(sel) => self.root.find(sel.parts()).map_or(0, |node| node.free(t)),
            None => {
                let exempt = self
                    .node_provider
                    .as_ref()
                    .map(|p| p.used_nodes(t))
                    .unwrap_or_default();
                self.root.free_except(t, &|cluster, host| {
                    exempt.get(cluster).is_some_and(|hosts| hosts.iter().any(|h| h == host))
                })
            }
        }
    }

    /// Forcibly releases a single oldest buffer segment somewhere in the
    /// tree. Returns the number of segments freed (0 if the tree is empty).
    pub fn force_free(&self) -> usize {
        self.root.force_free_one()
    }

    pub fn size_in_bytes(&self) -> usize {
        self.root.size_in_bytes()
    }

    pub fn size_in_gb(&self) -> f64 {
        self.size_in_bytes() as f64 / 1_000_000_000.0
    }

    /// Immediate children of the node resolved by `selector`.
    pub fn list_children(&self, selector: &Selector) -> Result<Vec<String>> {
        let node = self
            .root
            .find(selector.parts())
            .ok_or(Error::MetricOrHostNotFound)?;
        Ok(node.child_labels())
    }

    /// The root tree node. Used by the checkpointer, loader, and retention
    /// sweep, which all need to walk or attach to the tree directly.
    pub fn root(&self) -> &Arc<Level> {
        &self.root
    }

    /// Every `(cluster, host)` pair currently present in the tree, with the
    /// host's node. The checkpointer and retention sweep both operate at
    /// this granularity.
    pub fn cluster_hosts(&self) -> Vec<(String, String, Arc<Level>)> {
        let mut out = Vec::new();
        for (cluster, cluster_node) in self.root.children() {
            for (host, host_node) in cluster_node.children() {
                out.push((cluster.clone(), host.clone(), host_node));
            }
        }
        out
    }
}

fn collect_buffers(node: &Arc<Level>, offset: usize, out: &mut Vec<Arc<Level>>) {
    if node.has_metric(offset) {
        out.push(Arc::clone(node));
    }
    for child in node.children().into_values() {
        collect_buffers(&child, offset, out);
    }
}

fn reduce(reads: &[(Vec<MetricValue>, i64, i64)], scale: f32) -> Vec<MetricValue> {
    let len = reads[0].0.len();
    (0..len)
        .map(|i| {
            let mut any_nan = false;
            let mut sum = 0.0f32;
            for (data, _, _) in reads {
                let v = data[i];
                if v.is_nan() {
                    any_nan = true;
                } else {
                    sum += v.get();
                }
            }
            if any_nan {
                MetricValue::NAN
            } else {
                MetricValue::new(sum * scale)
            }
        })
        .collect()
}
