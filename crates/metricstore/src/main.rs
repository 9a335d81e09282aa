//! Entry point: loads configuration, reconstructs the in-memory tree from
//! disk, and runs ingest, checkpointing, archival, and retention under one
//! cancellation token until a shutdown signal arrives. Wiring an HTTP/RPC
//! surface onto `metricstore_api::handle` is left to the out-of-scope web
//! front end; this binary exposes no server of its own.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use clap::Parser;
use metricstore_config::Config;
use metricstore_core::MemoryStore;
use metricstore_ingest::SubscriptionConfig;
use metricstore_persist::{Archiver, ArchiverConfig, Checkpointer, CheckpointerConfig, Loader, LoaderConfig};
use metricstore_retention::{MemoryCapEnforcer, RetentionSweep};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(about = "HPC job-monitoring metric store", long_about = None)]
struct Args {
    /// Path to the JSON configuration file.
    #[arg(long, default_value = "metricstore.json")]
    config: PathBuf,
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the unix epoch")
        .as_millis() as i64
}

/// Fatal startup/shutdown conditions, each mapped to the process exit code
/// external operators key their alerting on.
enum Fatal {
    /// Exit 1: anything before the store is usable — bad config, NATS
    /// connection failure, and the like.
    Startup(anyhow::Error),
    /// Exit 2: the checkpoint directory on disk couldn't be replayed.
    CheckpointCorruption(anyhow::Error),
    /// Exit 3: the cap enforcer could not bring memory usage under
    /// `memory-cap` no matter how much it freed.
    CapBreach,
}

impl Fatal {
    fn exit_code(&self) -> i32 {
        match self {
            Fatal::Startup(_) => 1,
            Fatal::CheckpointCorruption(_) => 2,
            Fatal::CapBreach => 3,
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config = match metricstore_config::load(&args.config) {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, path = %args.config.display(), "invalid configuration");
            std::process::exit(1);
        }
    };

    if let Err(fatal) = run(config).await {
        let code = fatal.exit_code();
        match &fatal {
            Fatal::Startup(err) => tracing::error!(error = %err, "fatal error during startup"),
            Fatal::CheckpointCorruption(err) => {
                tracing::error!(error = %err, "unparsable checkpoint directory");
            }
            Fatal::CapBreach => {
                tracing::error!("could not reduce memory usage below the configured cap");
            }
        }
        std::process::exit(code);
    }
}

async fn run(config: Config) -> Result<(), Fatal> {
    let start = now_millis();
    let registry = Arc::new(config.registry);
    let store = Arc::new(MemoryStore::new(registry, None));

    let loader = Loader::new(
        Arc::clone(&store),
        LoaderConfig {
            root_dir: config.checkpoint_directory.clone(),
            format: config.checkpoint_format,
            start_time_ms: start,
            retention_ms: config.retention_in_memory.as_millis() as i64,
            gc_trigger_interval: 0,
        },
    );
    let loaded = loader
        .load()
        .map_err(|err| Fatal::CheckpointCorruption(anyhow::anyhow!(err)))?;
    tracing::info!(loaded, "startup load complete");

    let cancel = CancellationToken::new();
    let mut workers = JoinSet::new();

    let checkpointer = Arc::new(Checkpointer::new(
        Arc::clone(&store),
        CheckpointerConfig {
            root_dir: config.checkpoint_directory.clone(),
            format: config.checkpoint_format,
            interval: config.checkpoint_interval,
            num_workers: config.num_workers,
            column_flush_interval: config.checkpoint_interval,
            buffer_minutes: 5,
        },
        start,
    ));
    workers.spawn(Arc::clone(&checkpointer).run(cancel.clone()));

    let archiver = Arc::new(Archiver::new(ArchiverConfig {
        checkpoint_root: config.checkpoint_directory.clone(),
        archive_root: config.archive_directory.clone(),
        interval: config.archive_interval,
        delete_instead: config.archive_delete_instead,
        format: config.checkpoint_format,
    }));
    workers.spawn(Arc::clone(&archiver).run(cancel.clone()));

    let sweep = {
        let mut sweep = RetentionSweep::new(Arc::clone(&store), config.retention_in_memory);
        if !config.cluster_retention.is_empty() {
            sweep = sweep.with_cluster_overrides(config.cluster_retention);
        }
        Arc::new(sweep)
    };
    workers.spawn(Arc::clone(&sweep).run(cancel.clone()));

    let cap_enforcer = Arc::new(MemoryCapEnforcer::new(Arc::clone(&store), config.memory_cap_gb));
    workers.spawn(Arc::clone(&cap_enforcer).run(cancel.clone()));

    if !config.nats_subscriptions.is_empty() {
        spawn_ingestor(Arc::clone(&store), &config.nats_subscriptions, cancel.clone(), &mut workers)
            .await
            .map_err(Fatal::Startup)?;
    }

    wait_for_shutdown_signal().await;
    tracing::info!("shutdown signal received");
    cancel.cancel();

    while let Some(joined) = workers.join_next().await {
        if let Err(err) = joined {
            tracing::error!(error = %err, "background task panicked during shutdown");
        }
    }

    // The cap enforcer cancels the token itself when it can't reduce memory
    // below the configured cap; treat that as the fatal exit condition the
    // external interface contract calls for.
    if store.size_in_gb() > config.memory_cap_gb {
        return Err(Fatal::CapBreach);
    }

    Ok(())
}

async fn spawn_ingestor(
    store: Arc<MemoryStore>,
    subscriptions: &[metricstore_config::NatsSubscription],
    cancel: CancellationToken,
    workers: &mut JoinSet<()>,
) -> anyhow::Result<()> {
    let client = async_nats::connect(
        std::env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_owned()),
    )
    .await
    .map_err(|err| anyhow::anyhow!("failed to connect to NATS: {err}"))?;

    let subs: Vec<SubscriptionConfig> = subscriptions
        .iter()
        .map(|s| SubscriptionConfig {
            subject: s.subject.clone(),
            cluster_tag: s.cluster_tag.clone(),
        })
        .collect();

    let tag_order = vec!["cluster".to_owned(), "host".to_owned()];
    workers.spawn(metricstore_ingest::run(store, client, subs, tag_order, None, cancel));
    Ok(())
}

async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
