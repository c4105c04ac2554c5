//! Site configuration: base directories and the tunable policy constants
//! named throughout the spec (retry backoff bounds, freshness timeouts,
//! disk-space floor, rotation threshold).
//!
//! Parsing beyond the camera declaration grammar (`registry`) is out of
//! scope (see spec §1), so this is deliberately just environment variables
//! plus documented defaults, not a config-file format.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::KernelError;

/// `MAX_RECORDING_HOURS` and `MAX_RECORDING_MINUTES` both appear in the
/// wild (spec §9, Open Question a). This repo accepts exactly one of them
/// at load time and rejects the other being set, so a deployment can never
/// silently run with two conflicting rotation thresholds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationThreshold(Duration);

impl RotationThreshold {
    pub fn from_duration(duration: Duration) -> Self {
        Self(duration)
    }

    pub fn as_duration(self) -> Duration {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct KernelConfig {
    /// Root directory containing `cam_config.txt`, `tmp/`, `record/`,
    /// `backup/`, and `streaming.log` (spec §6).
    pub base_dir: PathBuf,
    /// Name or path of the transcoder binary invoked by the driver
    /// (spec §4.A); `ffprobe` is assumed to live alongside it.
    pub transcoder_binary: String,
    pub ffprobe_binary: String,
    pub min_disk_space_gb: u64,
    pub rotation_threshold: RotationThreshold,
    /// Freshness watchdog poll interval and stall timeout (spec §4.D).
    pub hls_watchdog_interval: Duration,
    pub hls_update_timeout: Duration,
    /// Stream restart backoff bounds: `min(1 + 2*(k-1), cap)` seconds.
    pub stream_backoff_cap: Duration,
    /// Recording crash-recovery backoff bounds: doubling from `min` to `max`.
    pub recording_backoff_min: Duration,
    pub recording_backoff_max: Duration,
    /// RTSP / HLS probe timeouts (spec §5).
    pub rtsp_probe_timeout: Duration,
    pub hls_probe_timeout: Duration,
}

impl KernelConfig {
    pub fn cam_config_path(&self) -> PathBuf {
        self.base_dir.join("cam_config.txt")
    }

    pub fn tmp_root(&self) -> PathBuf {
        self.base_dir.join("tmp")
    }

    pub fn record_root(&self) -> PathBuf {
        self.base_dir.join("record")
    }

    pub fn backup_root(&self) -> PathBuf {
        self.base_dir.join("backup")
    }

    pub fn log_path(&self) -> PathBuf {
        self.base_dir.join("streaming.log")
    }

    /// Loads from environment variables, falling back to the defaults
    /// below. Returns a `PolicyViolation` if both `MAX_RECORDING_HOURS` and
    /// `MAX_RECORDING_MINUTES` are set, per spec §9 Open Question (a).
    pub fn from_env() -> Result<Self, KernelError> {
        let base_dir = std::env::var("CAMERA_KERNEL_BASE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("."));

        let hours = std::env::var("MAX_RECORDING_HOURS").ok();
        let minutes = std::env::var("MAX_RECORDING_MINUTES").ok();
        let rotation_threshold = match (hours, minutes) {
            (Some(_), Some(_)) => {
                return Err(KernelError::PolicyViolation {
                    message: "both MAX_RECORDING_HOURS and MAX_RECORDING_MINUTES are set; \
                              pick one rotation threshold"
                        .to_string(),
                });
            }
            (Some(h), None) => {
                let hours: f64 = h.parse().map_err(|_| KernelError::PolicyViolation {
                    message: format!("MAX_RECORDING_HOURS is not a number: {h}"),
                })?;
                RotationThreshold(Duration::from_secs_f64((hours * 3600.0).max(1.0)))
            }
            (None, Some(m)) => {
                let minutes: f64 = m.parse().map_err(|_| KernelError::PolicyViolation {
                    message: format!("MAX_RECORDING_MINUTES is not a number: {m}"),
                })?;
                RotationThreshold(Duration::from_secs_f64((minutes * 60.0).max(1.0)))
            }
            (None, None) => RotationThreshold(Duration::from_secs(3600)),
        };

        let min_disk_space_gb = std::env::var("MIN_DISK_SPACE_GB")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1);

        let transcoder_binary = std::env::var("FFMPEG_BINARY").unwrap_or_else(|_| "ffmpeg".to_string());
        let ffprobe_binary = std::env::var("FFPROBE_BINARY").unwrap_or_else(|_| "ffprobe".to_string());

        Ok(Self {
            base_dir,
            transcoder_binary,
            ffprobe_binary,
            min_disk_space_gb,
            rotation_threshold,
            hls_watchdog_interval: Duration::from_secs(10),
            hls_update_timeout: Duration::from_secs(20),
            stream_backoff_cap: Duration::from_secs(10),
            recording_backoff_min: Duration::from_secs(5),
            recording_backoff_max: Duration::from_secs(300),
            rtsp_probe_timeout: Duration::from_secs(5),
            hls_probe_timeout: Duration::from_secs(3),
        })
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::from_env().unwrap_or_else(|_| Self {
            base_dir: PathBuf::from("."),
            transcoder_binary: "ffmpeg".to_string(),
            ffprobe_binary: "ffprobe".to_string(),
            min_disk_space_gb: 1,
            rotation_threshold: RotationThreshold(Duration::from_secs(3600)),
            hls_watchdog_interval: Duration::from_secs(10),
            hls_update_timeout: Duration::from_secs(20),
            stream_backoff_cap: Duration::from_secs(10),
            recording_backoff_min: Duration::from_secs(5),
            recording_backoff_max: Duration::from_secs(300),
            rtsp_probe_timeout: Duration::from_secs(5),
            hls_probe_timeout: Duration::from_secs(3),
        })
    }
}

/// `min(1 + 2*(k-1), cap)` seconds, spec §4.D / §8.
pub fn stream_backoff(retry_count: u32, cap: Duration) -> Duration {
    let k = retry_count.max(1) as f64;
    Duration::from_secs_f64((1.0 + 2.0 * (k - 1.0)).min(cap.as_secs_f64()))
}

/// `min(5 * 2^(k-1), max)` seconds, spec §4.E / §8.
pub fn recording_backoff(attempt: u32, min: Duration, max: Duration) -> Duration {
    let k = attempt.max(1);
    let scaled = min.as_secs_f64() * 2f64.powi((k - 1) as i32);
    Duration::from_secs_f64(scaled.min(max.as_secs_f64()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_backoff_matches_formula() {
        assert_eq!(stream_backoff(1, Duration::from_secs(10)), Duration::from_secs_f64(1.0));
        assert_eq!(stream_backoff(2, Duration::from_secs(10)), Duration::from_secs_f64(3.0));
        assert_eq!(stream_backoff(10, Duration::from_secs(10)), Duration::from_secs_f64(10.0));
    }

    #[test]
    fn recording_backoff_doubles_then_caps() {
        assert_eq!(recording_backoff(1, Duration::from_secs(5), Duration::from_secs(300)), Duration::from_secs(5));
        assert_eq!(recording_backoff(2, Duration::from_secs(5), Duration::from_secs(300)), Duration::from_secs(10));
        assert_eq!(recording_backoff(7, Duration::from_secs(5), Duration::from_secs(300)), Duration::from_secs(300));
    }
}
