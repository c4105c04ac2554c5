//! Portable spawn/terminate/kill lifecycle for transcoder children
//! (spec §4.A).

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::time::{Duration, Instant};

use sysinfo::{Pid, System};
use tracing::{info, warn};

use super::platform::{assign_to_kill_on_exit_job, configure_hidden_console, kill_process_tree, send_terminate_signal};

const SPAWN_SETTLE_WINDOW: Duration = Duration::from_millis(500);
const SPAWN_FAILURE_STDERR_LIMIT: usize = 4096;

/// A running transcoder child plus the write handle the driver retains on
/// stdin so `terminate` can ask it to exit gracefully.
pub struct SpawnedChild {
    child: Child,
    stdin: Option<ChildStdin>,
    pub pid: u32,
}

impl SpawnedChild {
    /// Non-blocking liveness check; `Some(status)` once the child has
    /// exited.
    pub fn try_wait(&mut self) -> std::io::Result<Option<std::process::ExitStatus>> {
        self.child.try_wait()
    }
}

/// Launches the transcoder with `argv`, writing combined output to
/// `log_sink` (e.g. `streaming.log`, or a per-camera log file). Returns
/// within 500ms; if the child exits before that, returns the captured
/// stderr as the error so callers can report the failure.
pub fn spawn(binary: &str, argv: &[String], log_sink: &Path, high_priority: bool) -> anyhow::Result<SpawnedChild> {
    let mut cmd = Command::new(binary);
    cmd.args(argv);
    configure_hidden_console(&mut cmd);
    if high_priority {
        configure_high_priority(&mut cmd);
    }

    let log_file = std::fs::OpenOptions::new().create(true).append(true).open(log_sink)?;
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::from(log_file))
        .stderr(Stdio::piped());

    let mut child = cmd.spawn()?;
    let pid = child.id();
    assign_to_kill_on_exit_job(pid);

    let stdin = child.stdin.take();
    let mut stderr = child.stderr.take();

    let start = Instant::now();
    while start.elapsed() < SPAWN_SETTLE_WINDOW {
        if let Some(status) = child.try_wait()? {
            let mut captured = Vec::new();
            if let Some(stderr) = stderr.as_mut() {
                use std::io::Read;
                let mut buf = vec![0u8; SPAWN_FAILURE_STDERR_LIMIT];
                if let Ok(n) = stderr.read(&mut buf) {
                    captured.extend_from_slice(&buf[..n]);
                }
            }
            anyhow::bail!(
                "transcoder exited with {status} within the spawn settle window: {}",
                String::from_utf8_lossy(&captured).trim()
            );
        }
        std::thread::sleep(Duration::from_millis(10));
    }

    // The settle window passed without an early exit; stop reading stderr
    // so the rest of the child's run is unsupervised except via the
    // freshness watchdog and exit watcher that own this handle from here.
    drop(stderr);

    info!(pid, binary, "spawned transcoder child");
    Ok(SpawnedChild { child, stdin, pid })
}

#[cfg(windows)]
fn configure_high_priority(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;
    const ABOVE_NORMAL_PRIORITY_CLASS: u32 = 0x0000_8000;
    cmd.creation_flags(ABOVE_NORMAL_PRIORITY_CLASS);
}

#[cfg(not(windows))]
fn configure_high_priority(_cmd: &mut Command) {}

/// Terminate sequence (spec §4.A): soft `q`, wait, OS terminate signal,
/// wait `timeout`, OS kill signal (plus Windows tree-kill). Streams are
/// closed on every exit path.
pub fn terminate(mut spawned: SpawnedChild, timeout: Duration) {
    if let Some(mut stdin) = spawned.stdin.take() {
        let _ = stdin.write_all(b"q\n");
        let _ = stdin.flush();
    }

    if wait_for_exit(&mut spawned.child, Duration::from_secs(2)) {
        return;
    }

    send_terminate_signal(spawned.pid);
    if wait_for_exit(&mut spawned.child, timeout) {
        return;
    }

    warn!(pid = spawned.pid, "transcoder ignored soft quit and terminate signal; killing");
    kill_process_tree(spawned.pid);
    let _ = spawned.child.wait();
}

fn wait_for_exit(child: &mut Child, timeout: Duration) -> bool {
    let start = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(_)) => return true,
            Ok(None) => {}
            Err(_) => return false,
        }
        if start.elapsed() >= timeout {
            return false;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
}

/// Enumerates running transcoder processes and terminates those whose
/// command line contains a substring unique to `camera_id`. With no
/// `camera_id`, this is a deliberate no-op (spec §4.A / §9 Open Question b)
/// — callers that need a scorched-earth sweep use [`scorched_earth_kill`].
pub fn kill_all(camera_id: Option<&str>, transcoder_binary: &str) {
    let Some(camera_id) = camera_id else {
        return;
    };
    let needles = [
        format!("/tmp/{camera_id}/"),
        format!("\\tmp\\{camera_id}\\"),
        format!("camera_{camera_id}"),
        format!("camera{camera_id}"),
    ];

    let mut system = System::new();
    system.refresh_processes();
    for (pid, process) in system.processes() {
        if !process_looks_like_transcoder(process.name(), transcoder_binary) {
            continue;
        }
        let cmdline = process.cmd().join(" ");
        if needles.iter().any(|needle| cmdline.contains(needle.as_str())) {
            kill_process_tree(pid_as_u32(*pid));
        }
    }
}

/// Unconditional termination of every transcoder process on the host by
/// image name, reserved for `stop_all_recordings`'s escalation path
/// (spec §4.F/§9).
pub fn scorched_earth_kill(transcoder_binary: &str) {
    let mut system = System::new();
    system.refresh_processes();
    for (pid, process) in system.processes() {
        if process_looks_like_transcoder(process.name(), transcoder_binary) {
            kill_process_tree(pid_as_u32(*pid));
        }
    }
}

fn process_looks_like_transcoder(process_name: &str, transcoder_binary: &str) -> bool {
    process_name.eq_ignore_ascii_case(transcoder_binary)
        || process_name.eq_ignore_ascii_case(&format!("{transcoder_binary}.exe"))
}

/// True if any process on the host still matches `transcoder_binary` by
/// image name. Used by `stop_all_recordings`'s escalation cascade, since
/// the supervisor's own worker map is already empty by the time that
/// cascade runs and can't answer "did anything survive" on its own.
pub fn any_transcoder_running(transcoder_binary: &str) -> bool {
    let mut system = System::new();
    system.refresh_processes();
    system.processes().values().any(|process| process_looks_like_transcoder(process.name(), transcoder_binary))
}

fn pid_as_u32(pid: Pid) -> u32 {
    pid.as_u32()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{self, EnvVarGuard};

    #[test]
    fn spawn_and_terminate_round_trip_via_mock_transcoder() {
        let _lock = test_support::env_lock();
        let _guard = EnvVarGuard::capture(["CAMERA_KERNEL_MOCK_RUN_SECONDS"]);
        test_support::set_env("CAMERA_KERNEL_MOCK_RUN_SECONDS", "30");

        let binary = test_support::locate_mock_ffmpeg_exe();
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("child.log");
        let output_path = dir.path().join("out.mp4");

        let spawned = spawn(&binary.to_string_lossy(), &[output_path.to_string_lossy().to_string()], &log_path, false).unwrap();
        assert!(spawned.pid > 0);

        terminate(spawned, Duration::from_secs(5));
    }

    #[test]
    fn spawn_reports_failure_when_the_child_exits_within_the_settle_window() {
        let _lock = test_support::env_lock();
        let _guard = EnvVarGuard::capture(["CAMERA_KERNEL_MOCK_RUN_SECONDS", "CAMERA_KERNEL_MOCK_EXIT_CODE"]);
        test_support::set_env("CAMERA_KERNEL_MOCK_RUN_SECONDS", "0");
        test_support::set_env("CAMERA_KERNEL_MOCK_EXIT_CODE", "1");

        let binary = test_support::locate_mock_ffmpeg_exe();
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("child.log");

        let result = spawn(&binary.to_string_lossy(), &[], &log_path, false);
        assert!(result.is_err());
    }
}

/// Remux-copy the file to a sibling temp path with the fast-start flag set,
/// then atomically replace the original. No-op if size is zero or path is
/// missing.
pub fn finalize(path: &Path, transcoder_binary: &str) -> anyhow::Result<()> {
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(_) => return Ok(()),
    };
    if metadata.len() == 0 {
        return Ok(());
    }

    let tmp_path: PathBuf = path.with_extension("faststart.tmp.mp4");
    let mut cmd = Command::new(transcoder_binary);
    configure_hidden_console(&mut cmd);
    cmd.args([
        "-v",
        "error",
        "-y",
        "-i",
    ])
    .arg(path)
    .args(["-c", "copy", "-movflags", "+faststart"])
    .arg(&tmp_path);

    let status = cmd.status()?;
    if status.success() && tmp_path.exists() {
        std::fs::rename(&tmp_path, path)?;
    } else {
        let _ = std::fs::remove_file(&tmp_path);
        anyhow::bail!("finalize remux failed for {}", path.display());
    }
    Ok(())
}
