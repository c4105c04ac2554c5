use std::path::PathBuf;
use std::time::Instant;

use serde::Serialize;
use thiserror::Error;

use crate::driver::SpawnedChild;

/// Distinguishes a disk-space rejection from any other start failure so
/// the Facade can map it to `KernelError::ResourceShortfall` without
/// string-matching an error message (spec §7).
#[derive(Debug, Error)]
#[error("{0}")]
pub struct DiskShortfall(pub String);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingPhase {
    Starting,
    Recording,
    Stopped,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Rtsp,
    Hls,
}

/// One per camera, owned by the Recording Supervisor (spec §3).
pub(super) struct RecordingWorker {
    pub status: RecordingPhase,
    pub child: Option<SpawnedChild>,
    pub archive_path: Option<PathBuf>,
    pub start_time: Option<Instant>,
    pub source_kind: Option<SourceKind>,
    pub rtsp_url: String,
    /// Bumped on stop to supersede any in-flight rotation or crash-recovery
    /// restart (same role as `stream::StreamWorker::generation`).
    pub generation: u64,
    pub crash_backoff_attempt: u32,
    pub next_crash_retry_at: Option<Instant>,
}

impl RecordingWorker {
    pub fn new(rtsp_url: String) -> Self {
        Self {
            status: RecordingPhase::Starting,
            child: None,
            archive_path: None,
            start_time: None,
            source_kind: None,
            rtsp_url,
            generation: 0,
            crash_backoff_attempt: 0,
            next_crash_retry_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RecordingStatus {
    pub status: RecordingPhase,
    pub source_kind: Option<SourceKind>,
}

impl From<&RecordingWorker> for RecordingStatus {
    fn from(worker: &RecordingWorker) -> Self {
        Self { status: worker.status, source_kind: worker.source_kind }
    }
}
