//! Subscribes to configured NATS subjects and writes every parsed sample
//! into the store.

use std::sync::Arc;

use futures::StreamExt;
use metricstore_core::{MemoryStore, Sample};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::mapping::{selector_from_tags, TagMapping};
use crate::parser::parse_line;

#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    pub subject: String,
    /// Overrides the default `"cluster"` tag key for this subscription.
    pub cluster_tag: Option<String>,
}

/// Spawns one subscription task per configured subject and runs them until
/// `cancel` fires.
pub async fn run(
    store: Arc<MemoryStore>,
    client: async_nats::Client,
    subscriptions: Vec<SubscriptionConfig>,
    tag_order: Vec<String>,
    default_cluster: Option<String>,
    cancel: CancellationToken,
) {
    let mut join_set = JoinSet::new();
    for sub in subscriptions {
        let store = Arc::clone(&store);
        let client = client.clone();
        let cancel = cancel.clone();
        let mut mapping = TagMapping::new(tag_order.clone());
        if let Some(cluster_tag) = sub.cluster_tag.clone() {
            mapping = mapping.with_cluster_tag(cluster_tag);
        }
        if let Some(default_cluster) = default_cluster.clone() {
            mapping = mapping.with_default_cluster(default_cluster);
        }
        join_set.spawn(async move {
            subscribe_loop(store, client, sub.subject, mapping, cancel).await;
        });
    }
    while join_set.join_next().await.is_some() {}
}

async fn subscribe_loop(
    store: Arc<MemoryStore>,
    client: async_nats::Client,
    subject: String,
    mapping: TagMapping,
    cancel: CancellationToken,
) {
    let mut subscription = match client.subscribe(subject.clone()).await {
        Ok(subscription) => subscription,
        Err(err) => {
            tracing::error!(subject = %subject, error = %err, "failed to subscribe");
            return;
        }
    };

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            next = subscription.next() => {
                let Some(message) = next else { break };
                handle_message(&store, &mapping, &message.payload);
            }
        }
    }
}

fn handle_message(store: &MemoryStore, mapping: &TagMapping, payload: &[u8]) {
    let Ok(text) = std::str::from_utf8(payload) else {
        tracing::warn!("dropping non-utf8 ingest message");
        return;
    };
    for line in text.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(line) {
            Ok(parsed) => {
                let selector = selector_from_tags(&parsed, mapping);
                let samples: Vec<Sample> = parsed
                    .fields
                    .iter()
                    .map(|(name, value)| Sample {
                        name: name.clone(),
                        value: (*value).into(),
                    })
                    .collect();
                if let Err(err) = store.write(&selector, parsed.timestamp, &samples) {
                    tracing::debug!(selector = %selector, error = %err, "dropping ingest sample");
                }
            }
            Err(err) => tracing::warn!(line, error = %err, "failed to parse ingest line"),
        }
    }
}
