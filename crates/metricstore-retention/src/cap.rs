//! Absolute memory-cap enforcement: a last-resort backstop behind
//! time-based retention, for when the tree is simply growing faster than
//! retention can keep up.

use std::sync::Arc;
use std::time::Duration;

use metricstore_core::MemoryStore;
use tokio_util::sync::CancellationToken;

const CHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Polls [`MemoryStore::size_in_gb`] and force-frees buffers when the store
/// exceeds `memory_cap_gb`.
pub struct MemoryCapEnforcer {
    store: Arc<MemoryStore>,
    memory_cap_gb: f64,
}

impl MemoryCapEnforcer {
    pub fn new(store: Arc<MemoryStore>, memory_cap_gb: f64) -> Self {
        Self { store, memory_cap_gb }
    }

    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(CHECK_INTERVAL);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if self.enforce() {
                        tracing::error!(
                            cap_gb = self.memory_cap_gb,
                            "memory cap exceeded and no buffers could be freed; raise the cap or shorten retention"
                        );
                        cancel.cancel();
                        break;
                    }
                }
            }
        }
    }

    /// Returns `true` if the store is still over the cap and nothing more
    /// could be freed (a fatal condition the caller should abort on).
    fn enforce(&self) -> bool {
        while self.store.size_in_gb() > self.memory_cap_gb {
            if self.store.force_free() == 0 {
                return true;
            }
        }
        false
    }
}
