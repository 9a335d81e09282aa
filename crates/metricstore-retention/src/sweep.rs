//! Time-based retention: periodically prunes data older than a rolling
//! window, exempting nodes a configured [`NodeProvider`] reports as still
//! in active use.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use metricstore_core::{MemoryStore, Selector};
use tokio_util::sync::CancellationToken;

/// Drives the retention sweep ticker.
///
/// A cluster named in `cluster_overrides` is swept against its own window
/// instead of `default_retention`; the ticker period is derived from the
/// shortest window in play so no cluster's override is missed.
pub struct RetentionSweep {
    store: Arc<MemoryStore>,
    default_retention: Duration,
    cluster_overrides: BTreeMap<String, Duration>,
}

impl RetentionSweep {
    pub fn new(store: Arc<MemoryStore>, default_retention: Duration) -> Self {
        Self {
            store,
            default_retention,
            cluster_overrides: BTreeMap::new(),
        }
    }

    pub fn with_cluster_overrides(mut self, overrides: BTreeMap<String, Duration>) -> Self {
        self.cluster_overrides = overrides;
        self
    }

    fn shortest_retention(&self) -> Duration {
        self.cluster_overrides
            .values()
            .copied()
            .chain(std::iter::once(self.default_retention))
            .min()
            .unwrap_or(self.default_retention)
    }

    /// Runs until `cancel` fires, sweeping every half of the shortest
    /// retention window in play.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let period = (self.shortest_retention() / 2).max(Duration::from_secs(1));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => self.sweep(),
            }
        }
    }

    fn sweep(&self) {
        let now = now_millis();

        if self.cluster_overrides.is_empty() {
            let cutoff = now - self.default_retention.as_millis() as i64;
            let freed = self.store.free(None, cutoff);
            tracing::debug!(kind = "retention", cutoff, freed, "retention sweep complete");
            return;
        }

        let clusters = self.store.list_children(&Selector::root()).unwrap_or_default();
        let mut total_freed = 0;
        for cluster in clusters {
            let retention = self
                .cluster_overrides
                .get(&cluster)
                .copied()
                .unwrap_or(self.default_retention);
            let cutoff = now - retention.as_millis() as i64;
            let sel = Selector::new([cluster]);
            total_freed += self.store.free(Some(&sel), cutoff);
        }
        tracing::debug!(
            kind = "retention",
            freed = total_freed,
            "retention sweep complete (per-cluster overrides)"
        );
    }
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock is after the unix epoch")
        .as_millis() as i64
}
