//! Reachability/capability probes (spec §4.A). `probe_reachable` and
//! `probe_audio` shell out to `ffprobe` with a bounded timeout via
//! [`crate::process_ext::run_command_with_timeout_capture_stderr`];
//! `probe_hls` is a plain HTTP GET.

use std::path::Path;
use std::process::Command;
use std::time::Duration;

use crate::process_ext::{run_command_with_timeout_capture_output, run_command_with_timeout_capture_stderr};

use super::platform::configure_hidden_console;

const STDERR_CAPTURE_LIMIT: usize = 4096;
const HLS_HEADER_TOKEN: &str = "#EXTM3U";

fn ffprobe_command(ffprobe_binary: &str, rtsp_url: &str, stream_selector: &str) -> Command {
    let mut cmd = Command::new(ffprobe_binary);
    configure_hidden_console(&mut cmd);
    cmd.args([
        "-v",
        "error",
        "-rtsp_transport",
        "tcp",
        "-select_streams",
        stream_selector,
        "-show_entries",
        "stream=codec_type",
        "-of",
        "csv=p=0",
        rtsp_url,
    ]);
    cmd
}

/// Attempts a short metadata read of the first video stream over TCP
/// transport. Returns within `timeout + 2s` as required by spec §4.A.
pub fn probe_reachable(ffprobe_binary: &str, rtsp_url: &str, timeout: Duration) -> (bool, Option<String>) {
    let cmd = ffprobe_command(ffprobe_binary, rtsp_url, "v:0");
    match run_command_with_timeout_capture_stderr(cmd, timeout + Duration::from_secs(2), STDERR_CAPTURE_LIMIT) {
        Ok((status, timed_out, stderr)) => {
            if timed_out {
                return (false, Some("probe timed out".to_string()));
            }
            if status.success() {
                (true, None)
            } else {
                (false, Some(String::from_utf8_lossy(&stderr).trim().to_string()))
            }
        }
        Err(err) => (false, Some(err.to_string())),
    }
}

/// True iff an audio stream is advertised by the upstream.
pub fn probe_audio(ffprobe_binary: &str, rtsp_url: &str) -> bool {
    let cmd = ffprobe_command(ffprobe_binary, rtsp_url, "a:0");
    match run_command_with_timeout_capture_output(cmd, Duration::from_secs(5), STDERR_CAPTURE_LIMIT) {
        Ok((status, timed_out, stdout, _stderr)) => {
            status.success() && !timed_out && !stdout.trim_ascii().is_empty()
        }
        Err(_) => false,
    }
}

/// HTTP GET with a short timeout; true iff 200 and the body begins with the
/// HLS header token.
pub fn probe_hls(url: &str, timeout: Duration) -> bool {
    let client = match reqwest::blocking::Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(_) => return false,
    };
    let Ok(response) = client.get(url).send() else {
        return false;
    };
    if !response.status().is_success() {
        return false;
    }
    let Ok(body) = response.text() else {
        return false;
    };
    body.trim_start().starts_with(HLS_HEADER_TOKEN)
}

/// Local equivalent of `probe_hls` for the recording supervisor's "is this
/// camera's own HLS currently serving" check (spec §4.E step 4). No HTTP
/// layer runs in-process, so this reads the playlist file directly from
/// disk instead of performing a loopback HTTP request.
pub fn probe_local_hls(playlist_path: &Path) -> bool {
    let Ok(body) = std::fs::read_to_string(playlist_path) else {
        return false;
    };
    !body.is_empty() && body.trim_start().starts_with(HLS_HEADER_TOKEN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{self, EnvVarGuard};

    #[test]
    fn probe_hls_rejects_non_hls_bodies() {
        // No network call happens here; this only exercises the parsing
        // predicate via a constructed body, since driving the live-request
        // path needs a real HTTP server.
        assert!("#EXTM3U\n#EXT-X-VERSION:3".starts_with(HLS_HEADER_TOKEN));
        assert!(!"<html>not hls</html>".starts_with(HLS_HEADER_TOKEN));
    }

    #[test]
    fn probe_reachable_reports_true_on_a_successful_exit() {
        let _lock = test_support::env_lock();
        let _guard = EnvVarGuard::capture(["CAMERA_KERNEL_MOCK_PROBE_EXIT_CODE", "CAMERA_KERNEL_MOCK_PROBE_STDOUT"]);
        test_support::remove_env("CAMERA_KERNEL_MOCK_PROBE_EXIT_CODE");
        test_support::set_env("CAMERA_KERNEL_MOCK_PROBE_STDOUT", "video");

        let binary = test_support::locate_mock_ffmpeg_exe();
        let (reachable, error) = probe_reachable(&binary.to_string_lossy(), "rtsp://192.0.2.1/stream", Duration::from_secs(2));
        assert!(reachable, "expected reachable, got error: {error:?}");
    }

    #[test]
    fn probe_reachable_reports_false_on_a_nonzero_exit() {
        let _lock = test_support::env_lock();
        let _guard = EnvVarGuard::capture(["CAMERA_KERNEL_MOCK_PROBE_EXIT_CODE"]);
        test_support::set_env("CAMERA_KERNEL_MOCK_PROBE_EXIT_CODE", "1");

        let binary = test_support::locate_mock_ffmpeg_exe();
        let (reachable, error) = probe_reachable(&binary.to_string_lossy(), "rtsp://192.0.2.1/stream", Duration::from_secs(2));
        assert!(!reachable);
        assert!(error.is_some());
    }

    #[test]
    fn probe_audio_is_false_when_no_audio_stream_is_reported() {
        let _lock = test_support::env_lock();
        let _guard = EnvVarGuard::capture(["CAMERA_KERNEL_MOCK_PROBE_STDOUT"]);
        test_support::remove_env("CAMERA_KERNEL_MOCK_PROBE_STDOUT");

        let binary = test_support::locate_mock_ffmpeg_exe();
        assert!(!probe_audio(&binary.to_string_lossy(), "rtsp://192.0.2.1/stream"));
    }
}
