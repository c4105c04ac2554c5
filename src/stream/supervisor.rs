//! Stream Supervisor (spec §4.D): one worker per camera producing a live
//! HLS playlist, with an exit watcher and a freshness watchdog.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

use tracing::{info, warn};

use crate::config::{self, KernelConfig};
use crate::driver;
use crate::fs_service;
use crate::sync_ext::MutexExt;

use super::spawner::spawn_stream;
use super::state::{StreamPhase, StreamStatus, StreamWorker};

const POLL_INTERVAL: Duration = Duration::from_millis(250);

pub struct StreamSupervisor {
    config: Arc<KernelConfig>,
    transcoder_binary: String,
    workers: Mutex<HashMap<String, Arc<Mutex<StreamWorker>>>>,
}

impl StreamSupervisor {
    pub fn new(config: Arc<KernelConfig>, transcoder_binary: impl Into<String>) -> Arc<Self> {
        Arc::new(Self { config, transcoder_binary: transcoder_binary.into(), workers: Mutex::new(HashMap::new()) })
    }

    /// Idempotent: a camera already tracked in the worker map is left
    /// alone (spec §3 invariant 1: at most one live stream child).
    pub fn start_stream(self: &Arc<Self>, camera_id: &str, rtsp_url: &str) -> anyhow::Result<()> {
        {
            let workers = self.workers.lock_unpoisoned();
            if workers.contains_key(camera_id) {
                return Ok(());
            }
        }

        let playlist_path = fs_service::playlist_path(&self.config.tmp_root(), camera_id);
        let worker = Arc::new(Mutex::new(StreamWorker::new(playlist_path)));

        {
            let mut workers = self.workers.lock_unpoisoned();
            workers.insert(camera_id.to_string(), worker.clone());
        }

        let supervisor = self.clone();
        let camera_id = camera_id.to_string();
        let rtsp_url = rtsp_url.to_string();
        std::thread::spawn(move || supervisor.run_worker(camera_id, rtsp_url, worker));

        Ok(())
    }

    pub fn stop_stream(&self, camera_id: &str) -> anyhow::Result<()> {
        let worker = {
            let mut workers = self.workers.lock_unpoisoned();
            workers.remove(camera_id)
        };
        let Some(worker) = worker else { return Ok(()) };

        let child = {
            let mut state = worker.lock_unpoisoned();
            state.status = StreamPhase::Stopped;
            state.generation += 1;
            state.child.take()
        };
        if let Some(child) = child {
            driver::terminate(child, Duration::from_secs(10));
        }
        Ok(())
    }

    pub fn restart_stream(self: &Arc<Self>, camera_id: &str, rtsp_url: &str) -> anyhow::Result<()> {
        self.stop_stream(camera_id)?;
        self.start_stream(camera_id, rtsp_url)
    }

    pub fn status(&self, camera_id: &str) -> Option<StreamStatus> {
        let workers = self.workers.lock_unpoisoned();
        workers.get(camera_id).map(|worker| StreamStatus::from(&*worker.lock_unpoisoned()))
    }

    pub fn active_count(&self) -> usize {
        self.workers.lock_unpoisoned().len()
    }

    /// Doubles as spawner and exit watcher for one camera across its
    /// whole lifetime, including restarts. Spawns a dedicated freshness
    /// watchdog thread per generation; the watchdog and this loop agree
    /// on ownership of the child handle through `StreamWorker::child`,
    /// guarded by the shared mutex, so neither ever double-terminates it.
    fn run_worker(self: Arc<Self>, camera_id: String, rtsp_url: String, worker: Arc<Mutex<StreamWorker>>) {
        let mut attempt: u32 = 0;

        loop {
            let generation = {
                let mut state = worker.lock_unpoisoned();
                if state.status == StreamPhase::Stopped {
                    return;
                }
                state.generation += 1;
                state.generation
            };

            if attempt > 0 {
                let backoff = config::stream_backoff(attempt, self.config.stream_backoff_cap);
                std::thread::sleep(backoff);
                if worker.lock_unpoisoned().generation != generation {
                    return;
                }
            }

            match spawn_stream(&self.config, &camera_id, &rtsp_url, &self.transcoder_binary) {
                Ok(outcome) => {
                    let mut state = worker.lock_unpoisoned();
                    if state.generation != generation {
                        drop(state);
                        driver::terminate(outcome.child, Duration::from_secs(5));
                        return;
                    }
                    state.child = Some(outcome.child);
                    state.status = outcome.initial_status;
                    state.retry_count = attempt;
                    state.consecutive_stall_failures = 0;
                    state.last_observed_update = Instant::now();
                    state.last_playlist_size = 0;
                    state.last_segment_mtime = None;
                }
                Err(err) => {
                    warn!(camera_id, error = %err, "stream spawn failed, retrying with backoff");
                    attempt += 1;
                    continue;
                }
            }

            let watchdog_supervisor = self.clone();
            let watchdog_worker = worker.clone();
            let watchdog_camera_id = camera_id.clone();
            let watchdog_handle =
                std::thread::spawn(move || watchdog_supervisor.run_freshness_watchdog(watchdog_camera_id, watchdog_worker, generation));

            let exit_status = loop {
                std::thread::sleep(POLL_INTERVAL);
                let mut state = worker.lock_unpoisoned();

                if state.generation != generation {
                    let leftover = state.child.take();
                    drop(state);
                    if let Some(leftover) = leftover {
                        driver::terminate(leftover, Duration::from_secs(10));
                    }
                    break None;
                }

                match state.child.as_mut().map(|child| child.try_wait()) {
                    Some(Ok(Some(status))) => {
                        state.child = None;
                        break Some(status);
                    }
                    Some(Ok(None)) => {}
                    Some(Err(_)) | None => break None,
                }
            };

            let _ = watchdog_handle.join();

            let mut state = worker.lock_unpoisoned();
            if state.status == StreamPhase::Stopped {
                return;
            }
            if let Some(status) = exit_status {
                info!(camera_id, %status, "stream transcoder exited");
                if state.generation == generation {
                    state.status = StreamPhase::ProcessDied;
                }
            }
            drop(state);
            attempt += 1;
        }
    }

    /// Every `hls_watchdog_interval`, checks playlist size and newest
    /// segment mtime. Any change resets the stall counter; after the
    /// configured number of consecutive stalls (`hls_update_timeout /
    /// hls_watchdog_interval`, normally 2) it bumps the generation to
    /// force the exit watcher to tear down and respawn (spec §4.D).
    fn run_freshness_watchdog(self: Arc<Self>, camera_id: String, worker: Arc<Mutex<StreamWorker>>, generation: u64) {
        let stall_threshold =
            (self.config.hls_update_timeout.as_secs() / self.config.hls_watchdog_interval.as_secs().max(1)).max(1) as u32;

        loop {
            std::thread::sleep(self.config.hls_watchdog_interval);

            let mut state = worker.lock_unpoisoned();
            if state.generation != generation {
                return;
            }

            let playlist_path = state.playlist_path.clone();
            let fresh = observe_freshness(&playlist_path, &mut state);

            if fresh {
                state.consecutive_stall_failures = 0;
                state.status = StreamPhase::Streaming;
            } else {
                state.consecutive_stall_failures += 1;
                if state.consecutive_stall_failures >= stall_threshold {
                    warn!(camera_id, "stream freshness watchdog observed repeated stalls, forcing restart");
                    state.status = StreamPhase::Restarting;
                    state.generation += 1;
                    return;
                }
                state.status = StreamPhase::Stalled;
            }
        }
    }
}

fn observe_freshness(playlist_path: &Path, state: &mut StreamWorker) -> bool {
    let current_size = std::fs::metadata(playlist_path).map(|meta| meta.len()).unwrap_or(0);
    let newest_segment_mtime = newest_segment_mtime(playlist_path.parent());

    let size_changed = current_size != state.last_playlist_size;
    let segment_changed = match (newest_segment_mtime, state.last_segment_mtime) {
        (Some(new), Some(old)) => new > old,
        (Some(_), None) => true,
        _ => false,
    };

    state.last_playlist_size = current_size;
    if newest_segment_mtime.is_some() {
        state.last_segment_mtime = newest_segment_mtime;
    }

    if size_changed || segment_changed {
        state.last_observed_update = Instant::now();
        true
    } else {
        false
    }
}

fn newest_segment_mtime(dir: Option<&Path>) -> Option<SystemTime> {
    let dir = dir?;
    std::fs::read_dir(dir)
        .ok()?
        .flatten()
        .filter(|entry| entry.path().extension().and_then(|ext| ext.to_str()) == Some("ts"))
        .filter_map(|entry| entry.metadata().ok()?.modified().ok())
        .max()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use crate::config::RotationThreshold;
    use crate::test_support::{self, EnvVarGuard};

    fn mock_config(base_dir: &Path, mock_binary: &str) -> KernelConfig {
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
    fn start_stream_then_stop_stream_round_trips_through_a_live_worker() {
        let _lock = test_support::env_lock();
        let _guard = EnvVarGuard::capture(["CAMERA_KERNEL_MOCK_RUN_SECONDS", "CAMERA_KERNEL_MOCK_PROBE_EXIT_CODE"]);
        test_support::set_env("CAMERA_KERNEL_MOCK_RUN_SECONDS", "20");
        test_support::remove_env("CAMERA_KERNEL_MOCK_PROBE_EXIT_CODE");

        let binary = test_support::locate_mock_ffmpeg_exe();
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(mock_config(dir.path(), &binary.to_string_lossy()));

        let supervisor = StreamSupervisor::new(config, binary.to_string_lossy().into_owned());
        supervisor.start_stream("cam1", "rtsp://192.0.2.1/stream").unwrap();

        let mut saw_active = false;
        for _ in 0..40 {
            if supervisor.active_count() == 1 {
                saw_active = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(100));
        }
        assert!(saw_active);
        assert!(supervisor.status("cam1").is_some());

        supervisor.stop_stream("cam1").unwrap();
        assert_eq!(supervisor.active_count(), 0);
    }

    #[test]
    fn observe_freshness_detects_playlist_size_change() {
        let dir = tempfile::tempdir().unwrap();
        let playlist = dir.path().join("cam1.m3u8");
        fs::write(&playlist, b"short").unwrap();

        let mut state = StreamWorker::new(playlist.clone());
        assert!(observe_freshness(&playlist, &mut state));
        assert!(!observe_freshness(&playlist, &mut state));

        fs::write(&playlist, b"a much longer playlist body").unwrap();
        assert!(observe_freshness(&playlist, &mut state));
    }

    #[test]
    fn observe_freshness_detects_new_segment_mtime() {
        let dir = tempfile::tempdir().unwrap();
        let playlist = dir.path().join("cam1.m3u8");
        fs::write(&playlist, b"fixed").unwrap();
        let mut state = StreamWorker::new(playlist.clone());
        observe_freshness(&playlist, &mut state);

        fs::write(dir.path().join("cam1_000.ts"), b"segment").unwrap();
        assert!(observe_freshness(&playlist, &mut state));
    }
}
