//! Stream spawn step (spec §4.D task 1): clean the camera's tmp directory,
//! kill any orphaned transcoder attributable to this camera, probe RTSP
//! reachability (non-fatal), and spawn the HLS transcoder.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::config::KernelConfig;
use crate::driver::{self, hls_streaming_args};
use crate::fs_service;

use super::state::StreamPhase;

pub(super) struct SpawnOutcome {
    pub child: driver::SpawnedChild,
    pub initial_status: StreamPhase,
}

pub(super) fn prepare_tmp_dir(tmp_root: &Path, camera_id: &str) -> anyhow::Result<PathBuf> {
    let dir = tmp_root.join(camera_id);
    fs_service::ensure_dir(&dir)?;
    if let Ok(read_dir) = std::fs::read_dir(&dir) {
        for entry in read_dir.flatten() {
            let _ = std::fs::remove_file(entry.path());
        }
    }
    Ok(dir)
}

pub(super) fn spawn_stream(
    config: &KernelConfig,
    camera_id: &str,
    rtsp_url: &str,
    transcoder_binary: &str,
) -> anyhow::Result<SpawnOutcome> {
    driver::kill_all(Some(camera_id), transcoder_binary);

    prepare_tmp_dir(&config.tmp_root(), camera_id)?;
    let playlist_path = fs_service::playlist_path(&config.tmp_root(), camera_id);
    let segment_pattern = fs_service::segment_pattern(&config.tmp_root(), camera_id);

    let (reachable, probe_error) = driver::probe_reachable(&config.ffprobe_binary, rtsp_url, config.rtsp_probe_timeout);
    let initial_status = if reachable {
        StreamPhase::Connected
    } else {
        warn!(camera_id, error = probe_error.as_deref().unwrap_or(""), "rtsp probe failed before streaming spawn, proceeding anyway");
        StreamPhase::ConnectionFailed
    };

    let argv = hls_streaming_args(rtsp_url, &playlist_path, &segment_pattern);
    let log_sink = config.log_path();
    let child = driver::spawn(transcoder_binary, &argv, &log_sink, false)?;

    Ok(SpawnOutcome { child, initial_status })
}
