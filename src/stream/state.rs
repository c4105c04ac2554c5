use std::path::PathBuf;
use std::time::{Instant, SystemTime};

use serde::Serialize;

use crate::driver::SpawnedChild;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamPhase {
    Initializing,
    Connected,
    ConnectionFailed,
    Streaming,
    Stalled,
    Restarting,
    ProcessDied,
    Error,
    Stopped,
}

/// One per camera, owned by the Stream Supervisor (spec §3).
pub(super) struct StreamWorker {
    pub child: Option<SpawnedChild>,
    pub playlist_path: PathBuf,
    pub status: StreamPhase,
    pub last_observed_update: Instant,
    pub last_playlist_size: u64,
    pub last_segment_mtime: Option<SystemTime>,
    pub consecutive_stall_failures: u32,
    pub retry_count: u32,
    /// Bumped on every (re)spawn. A background task that observes a
    /// generation mismatch against the worker it holds knows it has been
    /// superseded by a stop or a newer restart, and exits without acting
    /// (ordering guarantee: a stop cancels a restart-in-flight).
    pub generation: u64,
}

impl StreamWorker {
    pub fn new(playlist_path: PathBuf) -> Self {
        Self {
            child: None,
            playlist_path,
            status: StreamPhase::Initializing,
            last_observed_update: Instant::now(),
            last_playlist_size: 0,
            last_segment_mtime: None,
            consecutive_stall_failures: 0,
            retry_count: 0,
            generation: 0,
        }
    }
}

/// Serializable view of a stream worker for status snapshots.
#[derive(Debug, Clone, Serialize)]
pub struct StreamStatus {
    pub status: StreamPhase,
    pub retry_count: u32,
    pub consecutive_stall_failures: u32,
}

impl From<&StreamWorker> for StreamStatus {
    fn from(worker: &StreamWorker) -> Self {
        Self { status: worker.status, retry_count: worker.retry_count, consecutive_stall_failures: worker.consecutive_stall_failures }
    }
}
