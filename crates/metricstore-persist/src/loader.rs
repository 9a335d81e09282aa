//! Startup reconstruction of the in-memory tree from on-disk checkpoints.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use metricstore_core::{Buffer, MemoryStore, MetricValue};
use walkdir::WalkDir;

use crate::checkpoint::{self, CheckpointFile};
use crate::checkpointer::Format;
use crate::column;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct LoaderConfig {
    pub root_dir: PathBuf,
    pub format: Format,
    pub start_time_ms: i64,
    pub retention_ms: i64,
    /// Issue a GC hint every this many hosts loaded (0 disables it).
    pub gc_trigger_interval: usize,
}

pub struct Loader {
    store: Arc<MemoryStore>,
    config: LoaderConfig,
}

impl Loader {
    pub fn new(store: Arc<MemoryStore>, config: LoaderConfig) -> Self {
        Self { store, config }
    }

    /// Reconstructs the tree from whatever checkpoints are on disk. Returns
    /// the number of files successfully loaded.
    pub fn load(&self) -> Result<usize> {
        if !self.config.root_dir.exists() {
            std::fs::create_dir_all(&self.config.root_dir).map_err(|source| Error::Io {
                path: self.config.root_dir.clone(),
                source,
            })?;
            return Ok(0);
        }

        let mut format = self.config.format;
        let mut files = scan(&self.config.root_dir, format.extension());
        if files.is_empty() {
            format = format.alternate();
            files = scan(&self.config.root_dir, format.extension());
        }

        match format {
            Format::Json => self.load_json(files),
            Format::ColumnBlock => self.load_column(files),
        }
    }

    fn load_json(&self, files: Vec<PathBuf>) -> Result<usize> {
        let names: Vec<String> = self.store.registry().names().map(str::to_owned).collect();
        let cutoff = self.config.start_time_ms - self.config.retention_ms;

        let mut by_host: BTreeMap<(String, String), Vec<(i64, PathBuf)>> = BTreeMap::new();
        for path in files {
            let Some((cluster, host)) = relative_cluster_host(&self.config.root_dir, &path) else {
                continue;
            };
            let Some(ts) = json_file_ts(&path) else {
                continue;
            };
            if ts < cutoff {
                continue;
            }
            by_host.entry((cluster, host)).or_default().push((ts, path));
        }

        let mut loaded = 0;
        let mut hosts_done = 0;
        for ((cluster, host), mut entries) in by_host {
            entries.sort_by_key(|(ts, _)| *ts);
            for (_, path) in entries {
                match load_json_file(&self.store, &names, &path) {
                    Ok(()) => loaded += 1,
                    Err(Error::Decode { path, source }) => {
                        tracing::warn!(path = %path.display(), error = %source, "skipping unparsable checkpoint file");
                    }
                    Err(err) => {
                        tracing::error!(
                            cluster = %cluster,
                            host = %host,
                            error = %err,
                            "fatal error loading host, remaining files for this host skipped"
                        );
                        break;
                    }
                }
            }
            hosts_done += 1;
            if self.config.gc_trigger_interval > 0 && hosts_done % self.config.gc_trigger_interval == 0 {
                gc_hint();
            }
        }
        Ok(loaded)
    }

    fn load_column(&self, mut files: Vec<PathBuf>) -> Result<usize> {
        let names: Vec<String> = self.store.registry().names().map(str::to_owned).collect();
        let cutoff = self.config.start_time_ms - self.config.retention_ms;
        files.retain(|p| column_file_ts(p).is_some_and(|ts| ts >= cutoff));
        files.sort_by_key(|p| column_file_ts(p).unwrap_or(i64::MAX));

        let mut loaded = 0;
        for path in files {
            match load_column_file(&self.store, &names, &path) {
                Ok(()) => loaded += 1,
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "skipping column-block file");
                }
            }
        }
        Ok(loaded)
    }
}

/// A hook for a future allocator-aware GC nudge between host loads, kept as
/// a no-op (see the design notes' decision on forced-GC hints).
fn gc_hint() {}

fn scan(root: &Path, extension: &str) -> Vec<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(walkdir::DirEntry::into_path)
        .filter(|path| path.extension().and_then(std::ffi::OsStr::to_str) == Some(extension))
        .collect()
}

fn relative_cluster_host(root: &Path, path: &Path) -> Option<(String, String)> {
    let rel = path.strip_prefix(root).ok()?;
    let mut components = rel.components();
    let cluster = components.next()?.as_os_str().to_str()?.to_owned();
    let host = components.next()?.as_os_str().to_str()?.to_owned();
    Some((cluster, host))
}

fn json_file_ts(path: &Path) -> Option<i64> {
    path.file_stem()?.to_str()?.parse().ok()
}

fn column_file_ts(path: &Path) -> Option<i64> {
    let stem = path.file_stem()?.to_str()?;
    let (_, ts) = stem.split_once('_')?;
    ts.parse().ok()
}

fn load_json_file(store: &MemoryStore, names: &[String], path: &Path) -> Result<()> {
    let bytes = std::fs::read(path).map_err(|source| Error::Io {
        path: path.to_owned(),
        source,
    })?;
    let file: CheckpointFile = serde_json::from_slice(&bytes).map_err(|source| Error::Decode {
        path: path.to_owned(),
        source,
    })?;
    checkpoint::apply(store.root(), &file, names, names.len())?;
    Ok(())
}

fn load_column_file(store: &MemoryStore, names: &[String], path: &Path) -> Result<()> {
    let records = column::read_records(path)?;
    for record in records {
        for (key, value) in record.samples {
            let Some((path_part, metric)) = key.rsplit_once(column::METRIC_SEPARATOR) else {
                continue;
            };
            let Some(offset) = names.iter().position(|n| n == metric) else {
                continue;
            };
            let parts: Vec<String> = path_part.split(column::PATH_DELIMITER).map(str::to_owned).collect();
            let node = store.root().find_or_create(&parts, names.len());
            let effective_start = record.ts - record.resolution / 2;
            node.with_chain_mut(offset, |chain| {
                chain.append_archived_segment(Buffer {
                    start: effective_start,
                    frequency: record.resolution,
                    data: vec![MetricValue::new(value)],
                    archived: true,
                    closed: false,
                })
            })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use metricstore_core::{Aggregation, MetricConfig, MetricRegistry, Sample, Selector};

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

    #[test]
    fn missing_root_is_created_and_reports_zero() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("checkpoints");
        let loader = Loader::new(
            store(),
            LoaderConfig {
                root_dir: root.clone(),
                format: Format::Json,
                start_time_ms: 0,
                retention_ms: 0,
                gc_trigger_interval: 0,
            },
        );
        assert_eq!(loader.load().unwrap(), 0);
        assert!(root.exists());
    }

    #[test]
    fn loads_json_checkpoint_written_earlier() {
        let writer_store = store();
        let sel = Selector::new(["fritz", "n1"]);
        writer_store
            .write(
                &sel,
                0,
                &[Sample {
                    name: "flops".into(),
                    value: MetricValue::new(1.0),
                }],
            )
            .unwrap();
        writer_store
            .write(
                &sel,
                10,
                &[Sample {
                    name: "flops".into(),
                    value: MetricValue::new(2.0),
                }],
            )
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let names: Vec<String> = writer_store.registry().names().map(str::to_owned).collect();
        let host_node = writer_store.root().find(sel.parts()).unwrap();
        let file = checkpoint::capture("fritz", "n1", &host_node, &names, 0, 10).unwrap();
        let host_dir = dir.path().join("fritz").join("n1");
        std::fs::create_dir_all(&host_dir).unwrap();
        std::fs::write(host_dir.join("0.json"), serde_json::to_vec(&file).unwrap()).unwrap();

        let reader_store = store();
        let loader = Loader::new(
            Arc::clone(&reader_store),
            LoaderConfig {
                root_dir: dir.path().to_path_buf(),
                format: Format::Json,
                start_time_ms: 1_000_000,
                retention_ms: 1_000_000,
                gc_trigger_interval: 0,
            },
        );
        assert_eq!(loader.load().unwrap(), 1);

        let res = reader_store.read(&sel, "flops", 0, 10, 0).unwrap();
        assert_eq!(res.data, vec![MetricValue::new(1.0), MetricValue::new(2.0)]);
    }
}
