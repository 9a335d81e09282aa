//! The selector tree. Each [`Level`] is one tree node, lock-striped with its
//! own `parking_lot::RwLock` rather than a single store-wide lock, following
//! the same per-subtree locking shape as the selector-tree node this is
//! adapted from. Children are held behind `Arc` so callers can walk down the
//! tree and hold a node past the parent's lock guard without unsafe code.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::buffer::BufferChain;
use crate::error::Result;
use crate::selector::Selector;
use crate::value::MetricValue;

/// One node of the selector tree. Children are keyed by path-segment label
/// and created lazily on first write below them.
pub struct Level {
    children: RwLock<BTreeMap<String, Arc<Level>>>,
    /// One chain slot per registered metric, indexed by
    /// [`crate::registry::MetricConfig::offset`]. `None` until the first
    /// write for that metric reaches this exact node.
    metrics: RwLock<Vec<Option<BufferChain>>>,
}

impl Level {
    pub fn new(num_metrics: usize) -> Self {
        Self {
            children: RwLock::new(BTreeMap::new()),
            metrics: RwLock::new((0..num_metrics).map(|_| None).collect()),
        }
    }

    pub fn root(num_metrics: usize) -> Arc<Level> {
        Arc::new(Self::new(num_metrics))
    }

    pub fn is_leaf(&self) -> bool {
        self.children.read().is_empty()
    }

    /// Descends `path` from `self`, creating any missing intermediate nodes.
    /// `num_metrics` sizes freshly created nodes' metric slices.
    pub fn find_or_create(self: &Arc<Self>, path: &[String], num_metrics: usize) -> Arc<Level> {
        let mut current = Arc::clone(self);
        for part in path {
            let existing = current.children.read().get(part).cloned();
            let next = match existing {
                Some(child) => child,
                None => {
                    let mut children = current.children.write();
                    Arc::clone(
                        children
                            .entry(part.clone())
                            .or_insert_with(|| Arc::new(Level::new(num_metrics))),
                    )
                }
            };
            current = next;
        }
        current
    }

    /// Descends `path` from `self`, returning `None` if any segment is missing.
    pub fn find(self: &Arc<Self>, path: &[String]) -> Option<Arc<Level>> {
        let mut current = Arc::clone(self);
        for part in path {
            let next = current.children.read().get(part).cloned()?;
            current = next;
        }
        Some(current)
    }

    /// Writes `value` at `ts` for the metric at `offset`, creating the chain
    /// slot on first use. `frequency` comes from the metric registry.
    pub fn write(&self, offset: usize, ts: i64, value: MetricValue, frequency: i64) -> Result<()> {
        let mut metrics = self.metrics.write();
        let slot = &mut metrics[offset];
        let chain = slot.get_or_insert_with(BufferChain::new);
        chain.write(ts, value, frequency)
    }

    /// Reads `[from, to]` for the metric at `offset` at this exact node.
    /// Returns `None` if nothing has ever been written here.
    pub fn read(&self, offset: usize, from: i64, to: i64) -> Option<(Vec<MetricValue>, i64, i64)> {
        let metrics = self.metrics.read();
        metrics.get(offset)?.as_ref().map(|chain| chain.read(from, to))
    }

    /// Drops chain segments with no data at or after `t`, across this node
    /// and all descendants. A child whose subtree has become entirely empty
    /// is pruned from `self.children` once its own `free` call returns, so
    /// decommissioned hosts/clusters don't linger in the tree forever.
    /// Returns the total number of segments freed.
    pub fn free(&self, t: i64) -> usize {
        let mut freed = 0;
        {
            let mut metrics = self.metrics.write();
            for slot in metrics.iter_mut().flatten() {
                freed += slot.free_before(t);
            }
        }

        let mut children = self.children.write();
        let empty: Vec<String> = children
            .iter()
            .filter_map(|(label, child)| {
                freed += child.free(t);
                child.is_empty().then(|| label.clone())
            })
            .collect();
        for label in empty {
            children.remove(&label);
        }

        freed
    }

    /// Like [`Level::free`], but applied from the root: cluster children are
    /// always recursed into, while a `(cluster, host)` pair for which
    /// `exempt` returns `true` is left untouched (and so never pruned) at
    /// the host level. Used by [`crate::store::MemoryStore::free`]'s
    /// global sweep to honor [`crate::node_provider::NodeProvider`]
    /// exemptions while still pruning hosts/clusters that do age out.
    pub fn free_except(&self, t: i64, exempt: &dyn Fn(&str, &str) -> bool) -> usize {
        let mut freed = 0;

        let mut clusters = self.children.write();
        let empty_clusters: Vec<String> = clusters
            .iter()
            .filter_map(|(cluster, cluster_node)| {
                let mut hosts = cluster_node.children.write();
                let empty_hosts: Vec<String> = hosts
                    .iter()
                    .filter_map(|(host, host_node)| {
                        if exempt(cluster, host) {
                            return None;
                        }
                        freed += host_node.free(t);
                        host_node.is_empty().then(|| host.clone())
                    })
                    .collect();
                for host in empty_hosts {
                    hosts.remove(&host);
                }
                drop(hosts);
                cluster_node.is_empty().then(|| cluster.clone())
            })
            .collect();
        for cluster in empty_clusters {
            clusters.remove(&cluster);
        }

        freed
    }

    /// Whether this node currently holds no samples and has no children —
    /// the condition under which `free` prunes a node from its parent.
    fn is_empty(&self) -> bool {
        let no_data = self
            .metrics
            .read()
            .iter()
            .all(|slot| slot.as_ref().is_none_or(BufferChain::is_empty));
        no_data && self.children.read().is_empty()
    }

    /// Forcibly drops the single oldest segment across the whole subtree,
    /// regardless of age. Used by the memory cap enforcer when time-based
    /// retention alone hasn't freed enough. Returns the number of segments
    /// freed (0 or 1 — the caller loops).
    pub fn force_free_one(&self) -> usize {
        {
            let mut metrics = self.metrics.write();
            for slot in metrics.iter_mut().flatten() {
                if slot.force_free_oldest() == 1 {
                    return 1;
                }
            }
        }
        for child in self.children.read().values() {
            if child.force_free_one() == 1 {
                return 1;
            }
        }
        0
    }

    pub fn size_in_bytes(&self) -> usize {
        let own: usize = self
            .metrics
            .read()
            .iter()
            .flatten()
            .map(BufferChain::size_in_bytes)
            .sum();
        let children: usize = self.children.read().values().map(|c| c.size_in_bytes()).sum();
        own + children
    }

    /// Immediate child labels, for the query API's node listing.
    pub fn child_labels(&self) -> Vec<String> {
        self.children.read().keys().cloned().collect()
    }

    /// Visits every leaf selector below (and including) this node, appending
    /// to `out`. Used by the retention sweep to enumerate hosts.
    pub fn collect_paths(&self, prefix: &Selector, out: &mut Vec<Selector>) {
        let children = self.children.read();
        if children.is_empty() {
            out.push(prefix.clone());
            return;
        }
        for (label, child) in children.iter() {
            child.collect_paths(&prefix.child(label.clone()), out);
        }
    }

    /// Number of metric slots reserved at this node (registry size at
    /// construction time).
    pub fn num_metrics(&self) -> usize {
        self.metrics.read().len()
    }

    /// Runs `f` against the chain at `offset`, creating it if this is the
    /// first access. Used by the persistence layer to append loaded
    /// segments and to flag segments archived after a checkpoint write.
    pub fn with_chain_mut<R>(&self, offset: usize, f: impl FnOnce(&mut BufferChain) -> R) -> R {
        let mut metrics = self.metrics.write();
        let slot = metrics[offset].get_or_insert_with(BufferChain::new);
        f(slot)
    }

    /// Runs `f` against the chain at `offset`, if one has ever been written.
    pub fn with_chain<R>(&self, offset: usize, f: impl FnOnce(Option<&BufferChain>) -> R) -> R {
        let metrics = self.metrics.read();
        f(metrics.get(offset).and_then(Option::as_ref))
    }

    pub fn has_metric(&self, offset: usize) -> bool {
        self.metrics.read().get(offset).is_some_and(Option::is_some)
    }

    /// A cheap (`Arc`-cloning) snapshot of the immediate children map.
    pub fn children(&self) -> BTreeMap<String, Arc<Level>> {
        self.children.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(x: f32) -> MetricValue {
        MetricValue::new(x)
    }

    #[test]
    fn find_or_create_builds_intermediate_nodes() {
        let root = Level::root(1);
        let path = vec!["fritz".to_owned(), "n1337".to_owned()];
        let node = root.find_or_create(&path, 1);
        node.write(0, 100, v(1.0), 10).unwrap();

        let again = root.find(&path).unwrap();
        let (data, _, _) = again.read(0, 100, 100).unwrap();
        assert_eq!(data, vec![v(1.0)]);
    }

    #[test]
    fn find_on_missing_path_returns_none() {
        let root = Level::root(1);
        assert!(root.find(&["ghost".to_owned()]).is_none());
    }

    #[test]
    fn collect_paths_lists_only_leaves() {
        let root = Level::root(1);
        root.find_or_create(&["c1".to_owned(), "h1".to_owned()], 1);
        root.find_or_create(&["c1".to_owned(), "h2".to_owned()], 1);

        let mut out = Vec::new();
        root.collect_paths(&Selector::root(), &mut out);
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn free_removes_old_segments_across_subtree() {
        let root = Level::root(1);
        let node = root.find_or_create(&["c1".to_owned(), "h1".to_owned()], 1);
        for i in 0..600 {
            node.write(0, i * 10, v(i as f32), 10).unwrap();
        }
        // 600 samples at a 10ms frequency span [0, 5990]; free everything.
        let freed = root.free(6000);
        assert!(freed >= 1);
    }

    #[test]
    fn free_prunes_a_subtree_that_becomes_fully_empty() {
        let root = Level::root(1);
        root.find_or_create(&["c1".to_owned(), "h1".to_owned()], 1)
            .write(0, 0, v(1.0), 10)
            .unwrap();
        assert_eq!(root.children().len(), 1);

        root.free(1_000_000);

        assert!(
            root.children().is_empty(),
            "c1 should have been pruned once its only host's data aged out"
        );
    }

    #[test]
    fn free_keeps_a_sibling_with_remaining_data() {
        let root = Level::root(1);
        root.find_or_create(&["c1".to_owned(), "h1".to_owned()], 1)
            .write(0, 0, v(1.0), 10)
            .unwrap();
        root.find_or_create(&["c1".to_owned(), "h2".to_owned()], 1)
            .write(0, 1_000_000, v(2.0), 10)
            .unwrap();

        root.free(999_999);

        let c1 = root.find(&["c1".to_owned()]).expect("c1 still has live data under h2");
        assert_eq!(c1.children().len(), 1, "h1 pruned, h2 kept");
        assert!(c1.find(&["h2".to_owned()]).is_some());
        assert!(c1.find(&["h1".to_owned()]).is_none());
    }

    #[test]
    fn size_in_bytes_accounts_for_written_samples() {
        let root = Level::root(1);
        let node = root.find_or_create(&["c1".to_owned(), "h1".to_owned()], 1);
        node.write(0, 0, v(1.0), 10).unwrap();
        node.write(0, 10, v(2.0), 10).unwrap();
        assert_eq!(root.size_in_bytes(), 2 * std::mem::size_of::<MetricValue>());
    }
}
