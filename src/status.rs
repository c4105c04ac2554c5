//! Serializable snapshot types consumed by the (out-of-scope) HTTP layer.
//! Grounded on `original_source/app.py`'s `/system/cam/status` and
//! `/api/recordings` routes (spec SPEC_FULL.md §4.H/§4.I).

use std::path::PathBuf;

use serde::Serialize;

use crate::recording::RecordingStatus;
use crate::stream::StreamStatus;

#[derive(Debug, Clone, Serialize)]
pub struct DiskUsage {
    pub path: PathBuf,
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CameraStatus {
    pub camera_id: String,
    pub stream: Option<StreamStatus>,
    pub recording: Option<RecordingStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub disk_usage: Vec<DiskUsage>,
    pub active_streams: usize,
    pub active_recordings: usize,
    pub per_camera: Vec<CameraStatus>,
}

/// One entry in a `record/` or `backup/` listing (spec SPEC_FULL.md §4.I).
#[derive(Debug, Clone, Serialize)]
pub struct ArchiveEntry {
    pub camera_id: String,
    pub path: PathBuf,
    pub file_name: String,
    /// Parsed from the 14-digit timestamp embedded in the filename
    /// (spec §6, "Filename temporal format"); this is the canonical
    /// ordering key, not the filesystem mtime.
    pub started_at: chrono::NaiveDateTime,
    pub size_bytes: u64,
}

/// Result of a bulk operation across cameras: per-camera success/failure.
#[derive(Debug, Clone, Serialize)]
pub struct BulkResult {
    pub succeeded: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl BulkResult {
    pub fn new() -> Self {
        Self { succeeded: Vec::new(), failed: Vec::new() }
    }

    pub fn push_ok(&mut self, camera_id: impl Into<String>) {
        self.succeeded.push(camera_id.into());
    }

    pub fn push_err(&mut self, camera_id: impl Into<String>, message: impl Into<String>) {
        self.failed.push((camera_id.into(), message.into()));
    }

    pub fn is_empty(&self) -> bool {
        self.succeeded.is_empty() && self.failed.is_empty()
    }
}

impl Default for BulkResult {
    fn default() -> Self {
        Self::new()
    }
}
