//! Periodically bundles (or deletes) checkpoint files old enough that the
//! loader's retention window will never need them again.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;

use crate::checkpointer::Format;
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct ArchiverConfig {
    pub checkpoint_root: PathBuf,
    pub archive_root: PathBuf,
    pub interval: Duration,
    pub delete_instead: bool,
    pub format: Format,
}

pub struct Archiver {
    config: ArchiverConfig,
}

impl Archiver {
    pub fn new(config: ArchiverConfig) -> Self {
        Self { config }
    }

    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let now = now_millis();
                    if let Err(err) = self.tick(now) {
                        tracing::error!(error = %err, "archive tick failed");
                    }
                }
            }
        }
    }

    fn tick(&self, now: i64) -> Result<()> {
        let cutoff = now - self.config.interval.as_millis() as i64;
        for (labels, dir) in list_groups(&self.config.checkpoint_root, self.config.format) {
            self.archive_group(&labels, &dir, cutoff)?;
        }
        Ok(())
    }

    fn archive_group(&self, labels: &[String], dir: &Path, cutoff: i64) -> Result<()> {
        let mut entries: Vec<(i64, PathBuf)> = std::fs::read_dir(dir)
            .map_err(|source| Error::Io {
                path: dir.to_owned(),
                source,
            })?
            .filter_map(std::result::Result::ok)
            .map(|e| e.path())
            .filter_map(|path| file_ts(&path, self.config.format).map(|ts| (ts, path)))
            .collect();

        if entries.is_empty() {
            return Ok(());
        }
        entries.sort_by_key(|(ts, _)| *ts);
        let most_recent = entries.last().expect("checked non-empty above").1.clone();

        let candidates: Vec<PathBuf> = entries
            .into_iter()
            .filter(|(ts, path)| *ts < cutoff && *path != most_recent)
            .map(|(_, path)| path)
            .collect();
        if candidates.is_empty() {
            return Ok(());
        }

        if self.config.delete_instead {
            for path in &candidates {
                std::fs::remove_file(path).map_err(|source| Error::Io {
                    path: path.clone(),
                    source,
                })?;
            }
            return Ok(());
        }

        let archive_dir = labels.iter().fold(self.config.archive_root.clone(), |acc, label| acc.join(label));
        std::fs::create_dir_all(&archive_dir).map_err(|source| Error::Io {
            path: archive_dir.clone(),
            source,
        })?;
        let zip_path = archive_dir.join(format!("{cutoff}.zip"));
        write_zip(&zip_path, &candidates)?;
        for path in &candidates {
            std::fs::remove_file(path).map_err(|source| Error::Io {
                path: path.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

fn write_zip(zip_path: &Path, files: &[PathBuf]) -> Result<()> {
    let handle = std::fs::File::create(zip_path).map_err(|source| Error::Io {
        path: zip_path.to_owned(),
        source,
    })?;
    let mut writer = zip::ZipWriter::new(handle);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);
    for path in files {
        let name = path
            .file_name()
            .and_then(std::ffi::OsStr::to_str)
            .unwrap_or("unnamed");
        writer.start_file(name, options)?;
        let mut source = std::fs::File::open(path).map_err(|source| Error::Io {
            path: path.clone(),
            source,
        })?;
        std::io::copy(&mut source, &mut writer).map_err(|source| Error::Io {
            path: path.clone(),
            source,
        })?;
    }
    writer.finish()?;
    Ok(())
}

/// `(cluster, host)` directories for JSON checkpoints, or a single
/// `["column"]` pseudo-group for the flat column-block layout.
fn list_groups(root: &Path, format: Format) -> Vec<(Vec<String>, PathBuf)> {
    match format {
        Format::Json => WalkDir::new(root)
            .min_depth(2)
            .max_depth(2)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_dir())
            .filter_map(|entry| {
                let rel = entry.path().strip_prefix(root).ok()?;
                let labels: Vec<String> = rel
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                Some((labels, entry.path().to_owned()))
            })
            .collect(),
        Format::ColumnBlock => {
            let dir = root.join("column");
            if dir.is_dir() {
                vec![(vec!["column".to_owned()], dir)]
            } else {
                Vec::new()
            }
        }
    }
}

fn file_ts(path: &Path, format: Format) -> Option<i64> {
    if path.extension().and_then(std::ffi::OsStr::to_str) != Some(format.extension()) {
        return None;
    }
    let stem = path.file_stem()?.to_str()?;
    match format {
        Format::Json => stem.parse().ok(),
        Format::ColumnBlock => stem.split_once('_')?.1.parse().ok(),
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

    #[test]
    fn archive_group_never_removes_most_recent_file() {
        let checkpoint_dir = tempfile::tempdir().unwrap();
        let archive_dir = tempfile::tempdir().unwrap();
        let host_dir = checkpoint_dir.path().join("fritz").join("n1");
        std::fs::create_dir_all(&host_dir).unwrap();
        std::fs::write(host_dir.join("0.json"), b"{}").unwrap();
        std::fs::write(host_dir.join("1000.json"), b"{}").unwrap();

        let archiver = Archiver::new(ArchiverConfig {
            checkpoint_root: checkpoint_dir.path().to_path_buf(),
            archive_root: archive_dir.path().to_path_buf(),
            interval: Duration::from_millis(1),
            delete_instead: false,
            format: Format::Json,
        });
        archiver.archive_group(&["fritz".into(), "n1".into()], &host_dir, 10_000).unwrap();

        assert!(!host_dir.join("0.json").exists());
        assert!(host_dir.join("1000.json").exists(), "most recent file must survive");
    }

    #[test]
    fn delete_instead_removes_without_zipping() {
        let checkpoint_dir = tempfile::tempdir().unwrap();
        let archive_dir = tempfile::tempdir().unwrap();
        let host_dir = checkpoint_dir.path().join("fritz").join("n1");
        std::fs::create_dir_all(&host_dir).unwrap();
        std::fs::write(host_dir.join("0.json"), b"{}").unwrap();
        std::fs::write(host_dir.join("1000.json"), b"{}").unwrap();

        let archiver = Archiver::new(ArchiverConfig {
            checkpoint_root: checkpoint_dir.path().to_path_buf(),
            archive_root: archive_dir.path().to_path_buf(),
            interval: Duration::from_millis(1),
            delete_instead: true,
            format: Format::Json,
        });
        archiver.archive_group(&["fritz".into(), "n1".into()], &host_dir, 10_000).unwrap();

        assert!(!host_dir.join("0.json").exists());
        assert!(archive_dir.path().join("fritz").join("n1").read_dir().is_err()
            || archive_dir.path().join("fritz").join("n1").read_dir().unwrap().next().is_none());
    }
}
