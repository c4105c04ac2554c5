//! Camera Registry (spec §4.C): loads, caches, and watches the camera
//! declaration file, and resolves camera id to record.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant, SystemTime};

use serde::Serialize;
use tracing::warn;

use crate::sync_ext::{MutexExt, RwLockExt};

const CACHE_TTL: Duration = Duration::from_secs(60);
const CHANGE_MONITOR_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CameraRecord {
    pub id: String,
    pub name: String,
    pub rtsp_url: String,
    pub enabled: Option<bool>,
    pub auto_record: Option<bool>,
}

struct RegistryState {
    records: Vec<CameraRecord>,
    loaded_at: Option<Instant>,
    mtime: Option<SystemTime>,
}

impl RegistryState {
    fn empty() -> Self {
        Self { records: Vec::new(), loaded_at: None, mtime: None }
    }
}

/// Loads, caches, and watches `<base>/cam_config.txt` (spec §4.C grammar).
pub struct CameraRegistry {
    path: PathBuf,
    state: RwLock<RegistryState>,
    /// Serializes disk reads. A valid cache hit never takes this lock.
    load_lock: Mutex<()>,
}

impl CameraRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), state: RwLock::new(RegistryState::empty()), load_lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the current records, reloading from disk if the cache is
    /// stale, the file's mtime has shifted, or `force_reload` is set.
    pub fn load(&self, force_reload: bool) -> anyhow::Result<Vec<CameraRecord>> {
        let current_mtime = self.current_mtime();

        if !force_reload {
            let state = self.state.read_unpoisoned();
            if Self::is_valid(&state, current_mtime) {
                return Ok(state.records.clone());
            }
        }

        let _critical_section = self.load_lock.lock_unpoisoned();

        // Another thread may have refreshed the cache while we waited for
        // the lock; re-check before touching disk again.
        if !force_reload {
            let state = self.state.read_unpoisoned();
            if Self::is_valid(&state, current_mtime) {
                return Ok(state.records.clone());
            }
        }

        let content = std::fs::read_to_string(&self.path).unwrap_or_default();
        let records = parse_records(&content);

        let mut state = self.state.write_unpoisoned();
        state.records = records.clone();
        state.loaded_at = Some(Instant::now());
        state.mtime = current_mtime;
        Ok(records)
    }

    pub fn get(&self, camera_id: &str) -> anyhow::Result<Option<CameraRecord>> {
        Ok(self.load(false)?.into_iter().find(|record| record.id == camera_id))
    }

    /// Writes `records` back to the declaration file: a `.bak` sibling is
    /// written first, then the file is overwritten, then the cache is
    /// invalidated (spec §4.C).
    pub fn write(&self, records: &[CameraRecord]) -> anyhow::Result<()> {
        let content = serialize_records(records);

        if self.path.exists() {
            let backup_path = self.path.with_extension("txt.bak");
            std::fs::copy(&self.path, &backup_path)?;
        }
        std::fs::write(&self.path, content)?;

        let mut state = self.state.write_unpoisoned();
        state.loaded_at = None;
        Ok(())
    }

    fn current_mtime(&self) -> Option<SystemTime> {
        std::fs::metadata(&self.path).and_then(|meta| meta.modified()).ok()
    }

    fn is_valid(state: &RegistryState, current_mtime: Option<SystemTime>) -> bool {
        match state.loaded_at {
            Some(loaded_at) if loaded_at.elapsed() < CACHE_TTL => state.mtime == current_mtime,
            _ => false,
        }
    }
}

/// Spawns the background change monitor: every 60 s, checks the
/// declaration file's mtime and triggers a reload when it shifts (spec
/// §4.C). Exits when `registry` has no other owners.
pub fn spawn_change_monitor(registry: std::sync::Arc<CameraRegistry>) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        loop {
            std::thread::sleep(CHANGE_MONITOR_INTERVAL);
            if std::sync::Arc::strong_count(&registry) == 1 {
                return;
            }
            if let Err(err) = registry.load(false) {
                warn!(error = %err, "camera registry change monitor failed to reload");
            }
        }
    })
}

fn truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Parses the declaration file grammar (spec §4.C): one comma-separated
/// record per line, `#` and blank lines ignored, records missing id/name/
/// url or with an empty url skipped with a line-numbered warning.
/// Duplicate camera ids are a local policy violation (spec §7): the
/// offending later line is skipped and loading proceeds.
fn parse_records(content: &str) -> Vec<CameraRecord> {
    let mut records = Vec::new();
    let mut seen_ids = std::collections::HashSet::new();

    for (index, line) in content.lines().enumerate() {
        let line_no = index + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = trimmed.split(',').map(str::trim).collect();
        let id = fields.first().filter(|value| !value.is_empty());
        let name = fields.get(1).filter(|value| !value.is_empty());
        let rtsp_url = fields.get(2).filter(|value| !value.is_empty());

        let (Some(id), Some(name), Some(rtsp_url)) = (id, name, rtsp_url) else {
            warn!(line_no, line = trimmed, "skipping camera declaration missing id/name/url");
            continue;
        };

        if !seen_ids.insert(id.to_string()) {
            warn!(line_no, id, "skipping duplicate camera id in declaration file");
            continue;
        }

        records.push(CameraRecord {
            id: id.to_string(),
            name: name.to_string(),
            rtsp_url: rtsp_url.to_string(),
            enabled: fields.get(3).map(|value| truthy(value)),
            auto_record: fields.get(4).map(|value| truthy(value)),
        });
    }

    records
}

fn serialize_records(records: &[CameraRecord]) -> String {
    let mut out = String::new();
    for record in records {
        out.push_str(&record.id);
        out.push(',');
        out.push_str(&record.name);
        out.push(',');
        out.push_str(&record.rtsp_url);
        out.push(',');
        out.push_str(if record.enabled.unwrap_or(false) { "1" } else { "0" });
        out.push(',');
        out.push_str(if record.auto_record.unwrap_or(false) { "1" } else { "0" });
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_records_matches_end_to_end_scenario_1() {
        let content = "cam1,Front,rtsp://192.0.2.10:554/s,1,0\n# comment\ncam2,Back,rtsp://192.0.2.11:554/s";
        let records = parse_records(content);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "cam1");
        assert_eq!(records[0].enabled, Some(true));
        assert_eq!(records[0].auto_record, Some(false));
        assert_eq!(records[1].id, "cam2");
        assert_eq!(records[1].enabled, None);
    }

    #[test]
    fn parse_records_skips_missing_fields_and_duplicates() {
        let content = "cam1,Front,rtsp://a\ncam1,Front2,rtsp://b\n,NoId,rtsp://c\ncam3,NoUrl,";
        let records = parse_records(content);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "cam1");
        assert_eq!(records[0].name, "Front");
    }

    #[test]
    fn truthy_accepts_documented_spellings_case_insensitively() {
        for value in ["1", "true", "TRUE", "yes", "On"] {
            assert!(truthy(value), "{value} should be truthy");
        }
        for value in ["0", "false", "no", "", "off"] {
            assert!(!truthy(value), "{value} should not be truthy");
        }
    }

    #[test]
    fn load_caches_until_mtime_changes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cam_config.txt");
        std::fs::write(&path, "cam1,Front,rtsp://a\n").unwrap();

        let registry = CameraRegistry::new(&path);
        let first = registry.load(false).unwrap();
        assert_eq!(first.len(), 1);

        // Overwrite without changing mtime granularity guarantees is
        // flaky across filesystems, so exercise force_reload directly
        // instead of sleeping for an mtime tick.
        std::fs::write(&path, "cam1,Front,rtsp://a\ncam2,Back,rtsp://b\n").unwrap();
        let forced = registry.load(true).unwrap();
        assert_eq!(forced.len(), 2);
    }

    #[test]
    fn write_creates_backup_and_invalidates_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cam_config.txt");
        std::fs::write(&path, "cam1,Front,rtsp://a\n").unwrap();

        let registry = CameraRegistry::new(&path);
        registry.load(false).unwrap();

        let records = vec![CameraRecord {
            id: "cam2".to_string(),
            name: "Back".to_string(),
            rtsp_url: "rtsp://b".to_string(),
            enabled: Some(true),
            auto_record: None,
        }];
        registry.write(&records).unwrap();

        assert!(path.with_extension("txt.bak").exists());
        let reloaded = registry.load(false).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded[0].id, "cam2");
    }
}
