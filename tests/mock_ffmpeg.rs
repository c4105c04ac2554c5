//! Stand-in for both `ffmpeg` and `ffprobe`, driven entirely by environment
//! variables so the driver/spawner/supervisor tests never need a real media
//! toolchain on the machine running them. Built as its own `[[test]]`
//! binary (`harness = false`) so integration tests can point
//! `KernelConfig::transcoder_binary`/`ffprobe_binary` at it by path.
//!
//! Argument-shape detection: any invocation carrying `-show_entries` is
//! treated as an `ffprobe` call and answered synchronously; everything else
//! is treated as an `ffmpeg` invocation that may need to stay alive for a
//! caller to exercise `spawn`/`terminate` against.

use std::env;
use std::io::BufRead;
use std::time::{Duration, Instant};

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn env_i32(name: &str, default: i32) -> i32 {
    env::var(name).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

fn is_probe_invocation(argv: &[String]) -> bool {
    argv.iter().any(|arg| arg == "-show_entries")
}

/// The transcoder's argument vectors always end with the output path (the
/// playlist, the archive, or a remux temp file); probes never have one.
fn trailing_output_path(argv: &[String]) -> Option<&String> {
    argv.last().filter(|arg| !arg.starts_with('-'))
}

fn main() {
    let argv: Vec<String> = env::args().skip(1).collect();

    if is_probe_invocation(&argv) {
        if let Ok(stdout) = env::var("CAMERA_KERNEL_MOCK_PROBE_STDOUT") {
            print!("{stdout}");
        }
        std::process::exit(env_i32("CAMERA_KERNEL_MOCK_PROBE_EXIT_CODE", 0));
    }

    let output_bytes = env_u64("CAMERA_KERNEL_MOCK_OUTPUT_BYTES", 0);
    if output_bytes > 0
        && let Some(output_path) = trailing_output_path(&argv)
    {
        let _ = std::fs::write(output_path, vec![0u8; output_bytes as usize]);
    }

    let exit_code = env_i32("CAMERA_KERNEL_MOCK_EXIT_CODE", 0);
    let run_seconds = env_u64("CAMERA_KERNEL_MOCK_RUN_SECONDS", 0);

    // A graceful "q\n" on stdin (what `driver::terminate` sends first) ends
    // the run immediately, same as a real ffmpeg instance.
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines().map_while(Result::ok) {
            if line.trim_start().starts_with('q') {
                std::process::exit(exit_code);
            }
        }
    });

    let deadline = Instant::now() + Duration::from_secs(run_seconds);
    while Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(50));
    }
    std::process::exit(exit_code);
}
