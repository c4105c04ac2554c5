//! Recording start sequence (spec §4.E, steps 3-6): probe RTSP and audio,
//! probe the local HLS playlist, choose an input source (sticky to a
//! hint when possible), spawn, and verify the archive actually appears.

use std::path::Path;
use std::time::Duration;

use crate::config::KernelConfig;
use crate::driver;
use crate::fs_service;

use super::state::SourceKind;

pub(super) struct StartOutcome {
    pub child: driver::SpawnedChild,
    pub archive_path: std::path::PathBuf,
    pub source_kind: SourceKind,
}

/// Picks `rtsp` over `hls` by default; when `sticky` names a source kind,
/// that kind is tried first so a rotation or crash-recovery restart keeps
/// the departing child's input kind whenever it is still available (spec
/// §4.E "sticky source selection").
fn choose_source(reachable: bool, local_hls_available: bool, sticky: Option<SourceKind>) -> Option<SourceKind> {
    let order = match sticky {
        Some(SourceKind::Hls) => [SourceKind::Hls, SourceKind::Rtsp],
        _ => [SourceKind::Rtsp, SourceKind::Hls],
    };
    order.into_iter().find(|candidate| match candidate {
        SourceKind::Rtsp => reachable,
        SourceKind::Hls => local_hls_available,
    })
}

pub(super) fn start_sequence(
    config: &KernelConfig,
    camera_id: &str,
    rtsp_url: &str,
    transcoder_binary: &str,
    sticky: Option<SourceKind>,
) -> anyhow::Result<StartOutcome> {
    let (reachable, _probe_error) = driver::probe_reachable(&config.ffprobe_binary, rtsp_url, config.rtsp_probe_timeout);
    let has_audio = reachable && driver::probe_audio(&config.ffprobe_binary, rtsp_url);

    let playlist_path = fs_service::playlist_path(&config.tmp_root(), camera_id);
    let local_hls_available = driver::probe_local_hls(&playlist_path);

    let Some(source_kind) = choose_source(reachable, local_hls_available, sticky) else {
        anyhow::bail!("camera {camera_id}: neither rtsp nor local hls is available to record from");
    };

    let archive_path = fs_service::archive_path(&config.record_root(), camera_id)?;
    let argv = match source_kind {
        SourceKind::Rtsp => driver::rtsp_recording_args(rtsp_url, has_audio, &archive_path),
        SourceKind::Hls => driver::hls_recording_args(&playlist_path.to_string_lossy(), &archive_path),
    };

    let child = driver::spawn(transcoder_binary, &argv, &config.log_path(), false)?;
    let child = verify_archive_appeared(child, &archive_path)?;

    Ok(StartOutcome { child, archive_path, source_kind })
}

/// Spec §4.E step 6: wait 2s, then verify the child is alive and the
/// archive file exists, with up to 10 additional 1s retries. Kills the
/// child before returning an error so a failed verification never leaves
/// an unsupervised process behind.
fn verify_archive_appeared(mut child: driver::SpawnedChild, archive_path: &Path) -> anyhow::Result<driver::SpawnedChild> {
    std::thread::sleep(Duration::from_secs(2));

    for remaining_retries in (0..=10).rev() {
        match child.try_wait() {
            Ok(Some(status)) => anyhow::bail!("recording child exited during startup verification with {status}"),
            Ok(None) => {}
            Err(err) => {
                driver::terminate(child, Duration::from_secs(5));
                return Err(err.into());
            }
        }
        if archive_path.exists() {
            return Ok(child);
        }
        if remaining_retries == 0 {
            break;
        }
        std::thread::sleep(Duration::from_secs(1));
    }

    let archive_path = archive_path.display().to_string();
    driver::terminate(child, Duration::from_secs(5));
    anyhow::bail!("archive file {archive_path} did not appear within the verification window")
}
