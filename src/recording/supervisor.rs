//! Recording Supervisor (spec §4.E): one worker per camera producing a
//! continuous sequence of capped MP4 archives.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::config::{self, KernelConfig};
use crate::driver;
use crate::fs_service;
use crate::sync_ext::MutexExt;

use super::spawner::start_sequence;
use super::state::{DiskShortfall, RecordingPhase, RecordingStatus, RecordingWorker};

const MIN_VALID_ARCHIVE_BYTES: u64 = 1024 * 1024;
const CRASH_SWEEP_INTERVAL: Duration = Duration::from_secs(30);
const ROTATION_POLL_INTERVAL: Duration = Duration::from_secs(1);

pub struct RecordingSupervisor {
    config: Arc<KernelConfig>,
    transcoder_binary: String,
    workers: Mutex<HashMap<String, Arc<Mutex<RecordingWorker>>>>,
}

impl RecordingSupervisor {
    /// Also starts the single process-wide crash-recovery sweep task
    /// (spec §4.E, §9 "thread-per-camera sprawl" ceiling).
    pub fn new(config: Arc<KernelConfig>, transcoder_binary: impl Into<String>) -> Arc<Self> {
        let supervisor = Arc::new(Self { config, transcoder_binary: transcoder_binary.into(), workers: Mutex::new(HashMap::new()) });
        let sweeper = supervisor.clone();
        std::thread::spawn(move || sweeper.run_crash_recovery_sweep());
        supervisor
    }

    /// Start sequence (spec §4.E steps 1-6). Synchronous: returns only
    /// after the archive is spawned and verified, or after a definitive
    /// failure. On failure, existing workers for other cameras are left
    /// untouched and no entry is added for this camera.
    pub fn start_recording(self: &Arc<Self>, camera_id: &str, rtsp_url: &str) -> anyhow::Result<()> {
        let already_active = self.workers.lock_unpoisoned().contains_key(camera_id);
        if already_active {
            self.stop_recording(camera_id)?;
            std::thread::sleep(Duration::from_secs(3));
        }

        fs_service::ensure_dir(&self.config.record_root().join(camera_id))?;
        let free = fs_service::free_bytes(&self.config.record_root())?;
        let min_required = self.config.min_disk_space_gb * 1024 * 1024 * 1024;
        if free <= min_required {
            return Err(DiskShortfall(format!(
                "camera {camera_id}: {free} bytes free does not exceed the {min_required} byte floor"
            ))
            .into());
        }

        let outcome = start_sequence(&self.config, camera_id, rtsp_url, &self.transcoder_binary, None)?;

        let worker = Arc::new(Mutex::new(RecordingWorker::new(rtsp_url.to_string())));
        {
            let mut state = worker.lock_unpoisoned();
            state.child = Some(outcome.child);
            state.archive_path = Some(outcome.archive_path);
            state.start_time = Some(Instant::now());
            state.source_kind = Some(outcome.source_kind);
            state.status = RecordingPhase::Recording;
        }
        self.workers.lock_unpoisoned().insert(camera_id.to_string(), worker.clone());

        let supervisor = self.clone();
        let camera_id = camera_id.to_string();
        std::thread::spawn(move || supervisor.run_duration_watcher(camera_id, worker));

        Ok(())
    }

    /// Stop sequence (spec §4.E): terminate, inspect the produced file,
    /// finalize/delete/warn, always clear `start_time`.
    pub fn stop_recording(&self, camera_id: &str) -> anyhow::Result<()> {
        let worker = {
            let mut workers = self.workers.lock_unpoisoned();
            workers.remove(camera_id)
        };
        let Some(worker) = worker else { return Ok(()) };

        let (child, archive_path) = {
            let mut state = worker.lock_unpoisoned();
            state.status = RecordingPhase::Stopped;
            state.generation += 1;
            state.start_time = None;
            (state.child.take(), state.archive_path.take())
        };

        if let Some(child) = child {
            driver::terminate(child, Duration::from_secs(10));
        }
        if let Some(archive_path) = archive_path {
            finish_archive(&archive_path, &self.transcoder_binary);
        }
        Ok(())
    }

    pub fn status(&self, camera_id: &str) -> Option<RecordingStatus> {
        let workers = self.workers.lock_unpoisoned();
        workers.get(camera_id).map(|worker| RecordingStatus::from(&*worker.lock_unpoisoned()))
    }

    pub fn active_count(&self) -> usize {
        self.workers
            .lock_unpoisoned()
            .values()
            .filter(|worker| worker.lock_unpoisoned().child.is_some())
            .count()
    }

    pub fn active_camera_ids(&self) -> Vec<String> {
        self.workers.lock_unpoisoned().keys().cloned().collect()
    }

    /// Single long-lived task per camera, surviving every rotation (spec
    /// §9: "exactly one duration watcher per camera id"). Polls once a
    /// second: detects an unexpectedly dead child (handing recovery off
    /// to the crash sweep) and, once the active archive has run past
    /// `rotation_threshold`, performs the rotation itself with sticky
    /// source selection.
    fn run_duration_watcher(self: Arc<Self>, camera_id: String, worker: Arc<Mutex<RecordingWorker>>) {
        loop {
            std::thread::sleep(ROTATION_POLL_INTERVAL);

            let mut state = worker.lock_unpoisoned();
            if state.status == RecordingPhase::Stopped {
                return;
            }

            if let Some(child) = state.child.as_mut() {
                match child.try_wait() {
                    Ok(Some(exit_status)) => {
                        warn!(camera_id, %exit_status, "recording transcoder exited unexpectedly");
                        state.child = None;
                        state.start_time = None;
                        state.status = RecordingPhase::Error;
                        state.next_crash_retry_at = Some(Instant::now() + self.config.recording_backoff_min);
                        continue;
                    }
                    Ok(None) => {}
                    Err(_) => {}
                }
            }

            let Some(start_time) = state.start_time else { continue };
            if start_time.elapsed() < self.config.rotation_threshold.as_duration() {
                continue;
            }

            let archive_path = state.archive_path.take();
            let child = state.child.take();
            let sticky_source = state.source_kind;
            let rtsp_url = state.rtsp_url.clone();
            let generation = state.generation;
            state.status = RecordingPhase::Starting;
            drop(state);

            if let Some(child) = child {
                driver::terminate(child, Duration::from_secs(10));
            }
            if let Some(archive_path) = &archive_path {
                finish_archive(archive_path, &self.transcoder_binary);
            }
            std::thread::sleep(Duration::from_secs(2));

            match start_sequence(&self.config, &camera_id, &rtsp_url, &self.transcoder_binary, sticky_source) {
                Ok(outcome) => {
                    let mut state = worker.lock_unpoisoned();
                    if state.status == RecordingPhase::Stopped || state.generation != generation {
                        driver::terminate(outcome.child, Duration::from_secs(5));
                        return;
                    }
                    state.child = Some(outcome.child);
                    state.archive_path = Some(outcome.archive_path);
                    state.start_time = Some(Instant::now());
                    state.source_kind = Some(outcome.source_kind);
                    state.status = RecordingPhase::Recording;
                    info!(camera_id, "recording rotated to a new archive");
                }
                Err(err) => {
                    warn!(camera_id, error = %err, "recording rotation failed to respawn the successor archive");
                    let mut state = worker.lock_unpoisoned();
                    if state.status != RecordingPhase::Stopped {
                        state.status = RecordingPhase::Error;
                        state.next_crash_retry_at = Some(Instant::now() + self.config.recording_backoff_min);
                    }
                }
            }
        }
    }

    /// Shared process-wide task: every 30s, restarts any dead camera whose
    /// per-camera backoff has elapsed, doubling `crash_backoff_attempt` on
    /// each further failure and resetting it the first time a restart
    /// survives to be observed alive (spec §4.E).
    fn run_crash_recovery_sweep(self: Arc<Self>) {
        loop {
            std::thread::sleep(CRASH_SWEEP_INTERVAL);

            let snapshot: Vec<(String, Arc<Mutex<RecordingWorker>>)> = {
                let workers = self.workers.lock_unpoisoned();
                workers.iter().map(|(camera_id, worker)| (camera_id.clone(), worker.clone())).collect()
            };

            for (camera_id, worker) in snapshot {
                self.sweep_one(&camera_id, &worker);
            }
        }
    }

    fn sweep_one(self: &Arc<Self>, camera_id: &str, worker: &Arc<Mutex<RecordingWorker>>) {
        let (sticky, rtsp_url, attempt, generation) = {
            let mut state = worker.lock_unpoisoned();
            if state.status == RecordingPhase::Stopped {
                return;
            }
            if state.child.is_some() {
                state.crash_backoff_attempt = 0;
                state.next_crash_retry_at = None;
                return;
            }
            if let Some(next_at) = state.next_crash_retry_at
                && Instant::now() < next_at
            {
                return;
            }
            let attempt = state.crash_backoff_attempt + 1;
            state.status = RecordingPhase::Starting;
            (state.source_kind, state.rtsp_url.clone(), attempt, state.generation)
        };

        info!(camera_id, attempt, "recording crash-recovery sweep restarting camera");
        match start_sequence(&self.config, camera_id, &rtsp_url, &self.transcoder_binary, sticky) {
            Ok(outcome) => {
                let mut state = worker.lock_unpoisoned();
                if state.status == RecordingPhase::Stopped || state.generation != generation {
                    driver::terminate(outcome.child, Duration::from_secs(5));
                    return;
                }
                state.child = Some(outcome.child);
                state.archive_path = Some(outcome.archive_path);
                state.start_time = Some(Instant::now());
                state.source_kind = Some(outcome.source_kind);
                state.status = RecordingPhase::Recording;
                state.crash_backoff_attempt = 0;
                state.next_crash_retry_at = None;
            }
            Err(err) => {
                warn!(camera_id, error = %err, attempt, "recording crash-recovery restart attempt failed");
                let mut state = worker.lock_unpoisoned();
                state.crash_backoff_attempt = attempt;
                state.next_crash_retry_at =
                    Some(Instant::now() + config::recording_backoff(attempt, self.config.recording_backoff_min, self.config.recording_backoff_max));
                if state.status != RecordingPhase::Stopped {
                    state.status = RecordingPhase::Error;
                }
            }
        }
    }
}

/// Inspect the produced file at stop/rotation time: finalize archives
/// at least 1 MiB, delete smaller ones as corrupt, warn if absent (spec
/// §4.E, §3 invariant 5).
fn finish_archive(archive_path: &std::path::Path, transcoder_binary: &str) {
    match std::fs::metadata(archive_path) {
        Ok(meta) if meta.len() >= MIN_VALID_ARCHIVE_BYTES => {
            if let Err(err) = driver::finalize(archive_path, transcoder_binary) {
                warn!(path = %archive_path.display(), error = %err, "failed to finalize archive");
            }
        }
        Ok(_) => {
            warn!(path = %archive_path.display(), "archive below 1 MiB at stop, deleting as corrupt");
            let _ = std::fs::remove_file(archive_path);
        }
        Err(_) => warn!(path = %archive_path.display(), "archive missing at stop"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::config::RotationThreshold;
    use crate::test_support::{self, EnvVarGuard};

    fn mock_config(base_dir: &std::path::Path, mock_binary: &str) -> KernelConfig {
        KernelConfig {
            base_dir: base_dir.to_path_buf(),
            transcoder_binary: mock_binary.to_string(),
            ffprobe_binary: mock_binary.to_string(),
            min_disk_space_gb: 0,
            rotation_threshold: RotationThreshold::from_duration(Duration::from_secs(3600)),
            hls_watchdog_interval: Duration::from_secs(10),
            hls_update_timeout: Duration::from_secs(20),
            stream_backoff_cap: Duration::from_secs(10),
            recording_backoff_min: Duration::from_secs(5),
            recording_backoff_max: Duration::from_secs(300),
            rtsp_probe_timeout: Duration::from_secs(1),
            hls_probe_timeout: Duration::from_secs(1),
        }
    }

    #[test]
    fn start_recording_then_stop_recording_round_trips_and_finalizes_the_archive() {
        let _lock = test_support::env_lock();
        let _guard = EnvVarGuard::capture([
            "CAMERA_KERNEL_MOCK_RUN_SECONDS",
            "CAMERA_KERNEL_MOCK_OUTPUT_BYTES",
            "CAMERA_KERNEL_MOCK_PROBE_EXIT_CODE",
        ]);
        test_support::set_env("CAMERA_KERNEL_MOCK_RUN_SECONDS", "4");
        test_support::set_env("CAMERA_KERNEL_MOCK_OUTPUT_BYTES", (2 * 1024 * 1024).to_string());
        test_support::remove_env("CAMERA_KERNEL_MOCK_PROBE_EXIT_CODE");

        let binary = test_support::locate_mock_ffmpeg_exe();
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(mock_config(dir.path(), &binary.to_string_lossy()));

        let supervisor = RecordingSupervisor::new(config, binary.to_string_lossy().into_owned());
        supervisor.start_recording("cam1", "rtsp://192.0.2.1/stream").unwrap();

        let status = supervisor.status("cam1").unwrap();
        assert_eq!(status.status, RecordingPhase::Recording);
        assert_eq!(supervisor.active_count(), 1);

        supervisor.stop_recording("cam1").unwrap();
        assert_eq!(supervisor.active_count(), 0);
    }

    #[test]
    fn finish_archive_finalizes_large_files_and_deletes_small_ones() {
        let dir = tempfile::tempdir().unwrap();

        let small = dir.path().join("small.mp4");
        std::fs::write(&small, vec![0u8; 512 * 1024]).unwrap();
        finish_archive(&small, "true");
        assert!(!small.exists());

        let missing = dir.path().join("missing.mp4");
        finish_archive(&missing, "true");
    }
}
