//! The seam between the metric store and whatever job-scheduler integration
//! knows which nodes are currently allocated to a running job. Retention and
//! the memory cap enforcer use this to avoid freeing data for nodes that are
//! still in active use, even if it is older than the configured cutoff.

use std::collections::BTreeMap;

/// Supplies the set of nodes currently in use, grouped by cluster, as of a
/// point in time. Implementations typically ask a job scheduler (Slurm,
/// PBS, ...) which allocations are active at `as_of`.
pub trait NodeProvider: Send + Sync {
    /// Returns `cluster -> sorted, deduplicated hostnames` currently in use.
    fn used_nodes(&self, as_of: i64) -> BTreeMap<String, Vec<String>>;
}

/// A [`NodeProvider`] that reports no nodes in use. Used when no scheduler
/// integration is configured; retention then applies the time cutoff
/// unconditionally.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoExemptions;

impl NodeProvider for NoExemptions {
    fn used_nodes(&self, _as_of: i64) -> BTreeMap<String, Vec<String>> {
        BTreeMap::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_exemptions_reports_nothing() {
        assert!(NoExemptions.used_nodes(0).is_empty());
    }
}
