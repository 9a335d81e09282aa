//! Periodically flushes unarchived tree data to disk.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use metricstore_core::{Level, MemoryStore};
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::checkpoint::{self, CheckpointFile};
use crate::column::{self, StagingStore};
use crate::error::{Error, Result};

/// The on-disk checkpoint encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    ColumnBlock,
}

impl Format {
    pub fn extension(self) -> &'static str {
        match self {
            Format::Json => "json",
            Format::ColumnBlock => "avro",
        }
    }

    /// The other format, used by the loader's fallback scan.
    pub fn alternate(self) -> Format {
        match self {
            Format::Json => Format::ColumnBlock,
            Format::ColumnBlock => Format::Json,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckpointerConfig {
    pub root_dir: PathBuf,
    pub format: Format,
    pub interval: Duration,
    pub num_workers: usize,
    /// Column-block only: how often staged records are flushed to disk.
    pub column_flush_interval: Duration,
    /// Column-block only: minutes a staged record stays open for
    /// late-arriving samples before it is eligible to flush.
    pub buffer_minutes: i64,
}

impl CheckpointerConfig {
    pub fn default_num_workers() -> usize {
        (num_cpus::get() / 2 + 1).min(10)
    }
}

/// Drives periodic checkpoint writes for one [`MemoryStore`].
pub struct Checkpointer {
    store: Arc<MemoryStore>,
    config: CheckpointerConfig,
    last_checkpoint: AtomicI64,
    staging: Mutex<StagingStore>,
}

impl Checkpointer {
    pub fn new(store: Arc<MemoryStore>, config: CheckpointerConfig, process_start_ms: i64) -> Self {
        let buffer_minutes = config.buffer_minutes;
        Self {
            store,
            config,
            last_checkpoint: AtomicI64::new(process_start_ms),
            staging: Mutex::new(StagingStore::new(buffer_minutes)),
        }
    }

    /// Runs the checkpoint loop until `cancel` fires, then performs one
    /// final forced checkpoint before returning.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    tracing::info!("checkpointer shutting down, writing final checkpoint");
                    if let Err(err) = self.shutdown_checkpoint().await {
                        tracing::error!(error = %err, "final checkpoint failed");
                    }
                    break;
                }
                _ = ticker.tick() => {
                    let now = now_millis();
                    if let Err(err) = self.tick(now).await {
                        tracing::error!(error = %err, "checkpoint tick failed");
                    }
                }
            }
        }
    }

    async fn tick(&self, now: i64) -> Result<()> {
        let from = self.last_checkpoint.load(Ordering::SeqCst);
        match self.config.format {
            Format::Json => self.tick_json(from, now).await?,
            Format::ColumnBlock => {
                self.tick_column(from, now)?;
                self.flush_column(now, false)?;
            }
        }
        self.last_checkpoint.store(now, Ordering::SeqCst);
        Ok(())
    }

    async fn tick_json(&self, from: i64, to: i64) -> Result<()> {
        let names: Vec<String> = self.store.registry().names().map(str::to_owned).collect();
        let semaphore = Arc::new(Semaphore::new(self.config.num_workers.max(1)));
        let mut join_set = tokio::task::JoinSet::new();

        for (cluster, host, host_node) in self.store.cluster_hosts() {
            let semaphore = Arc::clone(&semaphore);
            let names = names.clone();
            let root_dir = self.config.root_dir.clone();
            join_set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("semaphore is never closed while the checkpointer runs");
                checkpoint_host(&root_dir, &cluster, &host, &host_node, &names, from, to)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(result) => result?,
                Err(join_err) => tracing::error!(error = %join_err, "checkpoint worker panicked"),
            }
        }
        Ok(())
    }

    fn tick_column(&self, from: i64, to: i64) -> Result<()> {
        let names: Vec<String> = self.store.registry().names().map(str::to_owned).collect();
        let mut staging = self.staging.lock();
        for (cluster, host, host_node) in self.store.cluster_hosts() {
            stage_subtree(&host_node, &[cluster.clone(), host], &names, from, to, &mut staging);
            checkpoint::mark_archived(&host_node, &names, from, to);
        }
        Ok(())
    }

    fn flush_column(&self, now: i64, force: bool) -> Result<()> {
        let records = {
            let mut staging = self.staging.lock();
            if force {
                staging.flush_all()
            } else {
                staging.flush_ready(now)
            }
        };
        if records.is_empty() {
            return Ok(());
        }
        let dir = self.config.root_dir.join("column");
        std::fs::create_dir_all(&dir).map_err(|source| Error::Io {
            path: dir.clone(),
            source,
        })?;
        for record in records {
            let path = dir.join(format!("{}_{}.{}", record.resolution, record.ts, Format::ColumnBlock.extension()));
            column::append_records(&path, std::slice::from_ref(&record))?;
        }
        Ok(())
    }

    /// Performs one forced checkpoint, flushing every staged column-block
    /// record regardless of age. Intended for clean shutdown.
    pub async fn shutdown_checkpoint(&self) -> Result<()> {
        let now = now_millis();
        let from = self.last_checkpoint.load(Ordering::SeqCst);
        match self.config.format {
            Format::Json => self.tick_json(from, now).await?,
            Format::ColumnBlock => {
                self.tick_column(from, now)?;
                self.flush_column(now, true)?;
            }
        }
        self.last_checkpoint.store(now, Ordering::SeqCst);
        Ok(())
    }
}

fn checkpoint_host(
    root_dir: &Path,
    cluster: &str,
    host: &str,
    host_node: &Level,
    names: &[String],
    from: i64,
    to: i64,
) -> Result<()> {
    let Some(file) = checkpoint::capture(cluster, host, host_node, names, from, to) else {
        return Ok(());
    };
    write_json(root_dir, cluster, host, from, &file)?;
    checkpoint::mark_archived(host_node, names, from, to);
    Ok(())
}

fn write_json(
    root_dir: &Path,
    cluster: &str,
    host: &str,
    from: i64,
    file: &CheckpointFile,
) -> Result<()> {
    let dir = root_dir.join(cluster).join(host);
    std::fs::create_dir_all(&dir).map_err(|source| Error::Io {
        path: dir.clone(),
        source,
    })?;
    let path = dir.join(format!("{from}.json"));
    let handle = std::fs::File::create(&path).map_err(|source| Error::Io {
        path: path.clone(),
        source,
    })?;
    let mut writer = std::io::BufWriter::new(handle);
    serde_json::to_writer(&mut writer, file).map_err(Error::Encode)?;
    use std::io::Write as _;
    writer.flush().map_err(|source| Error::Io { path, source })
}

fn stage_subtree(
    level: &Level,
    path: &[String],
    names: &[String],
    from: i64,
    to: i64,
    staging: &mut StagingStore,
) {
    for (offset, name) in names.iter().enumerate() {
        level.with_chain(offset, |chain| {
            let Some(chain) = chain else { return };
            chain.iter_from_to(from, to, |seg| {
                if seg.archived {
                    return;
                }
                let seg_end = seg.start + (seg.data.len() as i64 - 1) * seg.frequency;
                let mut ts = seg.start.max(from);
                let clip_to = seg_end.min(to);
                while ts <= clip_to {
                    let idx = ((ts - seg.start) / seg.frequency) as usize;
                    let value = seg.data[idx];
                    if !value.is_nan() {
                        staging.record(seg.frequency, ts, path, name, value.get());
                    }
                    ts += seg.frequency;
                }
            });
        });
    }
    for (label, child) in level.children() {
        let mut child_path = path.to_vec();
        child_path.push(label);
        stage_subtree(&child, &child_path, names, from, to, staging);
    }
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock is after the unix epoch")
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use metricstore_core::{Aggregation, MetricConfig, MetricRegistry, MetricValue, Sample, Selector};

    fn store() -> Arc<MemoryStore> {
        let mut reg = MetricRegistry::new();
        reg.add(
            "flops",
            MetricConfig {
                frequency: 10,
                aggregation: Aggregation::None,
                scope: None,
                unit: None,
                offset: 0,
            },
        );
        Arc::new(MemoryStore::new(Arc::new(reg), None))
    }

    #[tokio::test]
    async fn json_checkpoint_writes_one_file_per_host() {
        let store = store();
        let sel = Selector::new(["fritz", "n1"]);
        store
            .write(
                &sel,
                0,
                &[Sample {
                    name: "flops".into(),
                    value: MetricValue::new(1.0),
                }],
            )
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let config = CheckpointerConfig {
            root_dir: dir.path().to_path_buf(),
            format: Format::Json,
            interval: Duration::from_secs(3600),
            num_workers: 2,
            column_flush_interval: Duration::from_secs(60),
            buffer_minutes: 3,
        };
        let checkpointer = Checkpointer::new(store, config, 0);
        checkpointer.tick_json(0, 100).await.unwrap();

        let file_path = dir.path().join("fritz").join("n1").join("0.json");
        assert!(file_path.exists());
    }
}
