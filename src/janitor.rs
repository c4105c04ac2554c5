//! Janitor (spec §4.G): periodic pruning of orphaned HLs segments, plus an
//! explicit (non-automatic) archive-pruning operation.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::warn;

use crate::config::KernelConfig;
use crate::fs_service;
use crate::registry::CameraRegistry;

const HLS_SWEEP_INTERVAL: Duration = Duration::from_secs(15);
const SEGMENT_GRACE_PERIOD: Duration = Duration::from_secs(60);
const RECORD_AGE_MULTIPLIER: u64 = 24 * 3600;
const BACKUP_AGE_MULTIPLIER: u64 = RECORD_AGE_MULTIPLIER * 7;
const RECORD_FILE_CAP: usize = 100;
const BACKUP_FILE_CAP: usize = 50;

pub struct Janitor {
    config: Arc<KernelConfig>,
    registry: Arc<CameraRegistry>,
}

#[derive(Debug, Default)]
pub struct PruneReport {
    pub records_deleted: usize,
    pub backups_deleted: usize,
}

impl Janitor {
    pub fn new(config: Arc<KernelConfig>, registry: Arc<CameraRegistry>) -> Arc<Self> {
        Arc::new(Self { config, registry })
    }

    /// Spawns the 15s HLS janitor: for each camera, deletes `.ts` segments
    /// in its tmp directory that are neither referenced by the current
    /// playlist nor younger than 60s (spec §4.G, §3 invariant 5).
    pub fn spawn_hls_sweep(self: &Arc<Self>) -> std::thread::JoinHandle<()> {
        let janitor = self.clone();
        std::thread::spawn(move || {
            loop {
                std::thread::sleep(HLS_SWEEP_INTERVAL);
                janitor.sweep_hls_segments();
            }
        })
    }

    fn sweep_hls_segments(&self) {
        let records = match self.registry.load(false) {
            Ok(records) => records,
            Err(err) => {
                warn!(error = %err, "janitor failed to load camera registry");
                return;
            }
        };

        for record in records {
            let camera_dir = self.config.tmp_root().join(&record.id);
            let playlist_path = camera_dir.join(format!("{}.m3u8", record.id));
            let referenced = referenced_segments(&playlist_path);

            let Ok(entries) = std::fs::read_dir(&camera_dir) else { continue };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|ext| ext.to_str()) != Some("ts") {
                    continue;
                }
                let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else { continue };
                if referenced.contains(file_name) {
                    continue;
                }
                if is_younger_than(&entry, SEGMENT_GRACE_PERIOD) {
                    continue;
                }
                let _ = std::fs::remove_file(&path);
            }
        }
    }

    /// Explicit, not automatic: per-camera archive directories pruned by
    /// `rotation_threshold * 24h` age and a 100-file cap; backup
    /// directories use a 7x longer age horizon and a 50-file cap
    /// (spec §4.G).
    pub fn prune_archives(&self) -> anyhow::Result<PruneReport> {
        let records = self.registry.load(false)?;
        let rotation_secs = self.config.rotation_threshold.as_duration().as_secs();
        let mut report = PruneReport::default();

        for record in &records {
            let record_dir = self.config.record_root().join(&record.id);
            report.records_deleted +=
                fs_service::prune(&record_dir, ".mp4", Some(rotation_secs * RECORD_AGE_MULTIPLIER), Some(RECORD_FILE_CAP))?;

            let backup_dir = self.config.backup_root().join(&record.id);
            report.backups_deleted +=
                fs_service::prune(&backup_dir, ".mp4", Some(rotation_secs * BACKUP_AGE_MULTIPLIER), Some(BACKUP_FILE_CAP))?;
        }

        Ok(report)
    }
}

fn referenced_segments(playlist_path: &Path) -> HashSet<String> {
    let Ok(content) = std::fs::read_to_string(playlist_path) else {
        return HashSet::new();
    };
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| line.rsplit('/').next().unwrap_or(line).to_string())
        .collect()
}

fn is_younger_than(entry: &std::fs::DirEntry, age: Duration) -> bool {
    let Ok(metadata) = entry.metadata() else { return false };
    let Ok(modified) = metadata.modified() else { return false };
    SystemTime::now().duration_since(modified).unwrap_or(Duration::ZERO) < age
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn referenced_segments_parses_non_comment_lines() {
        let dir = tempfile::tempdir().unwrap();
        let playlist = dir.path().join("cam1.m3u8");
        fs::write(&playlist, "#EXTM3U\n#EXT-X-VERSION:3\ncam1_000.ts\ncam1_001.ts\n").unwrap();

        let referenced = referenced_segments(&playlist);
        assert_eq!(referenced.len(), 2);
        assert!(referenced.contains("cam1_000.ts"));
    }

    #[test]
    fn referenced_segments_handles_missing_playlist() {
        let referenced = referenced_segments(Path::new("/does/not/exist.m3u8"));
        assert!(referenced.is_empty());
    }
}
