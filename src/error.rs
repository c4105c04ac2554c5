//! Structured failure taxonomy for the kernel's public surface.
//!
//! Internal plumbing (probes, spawns, file IO inside a supervisor) stays on
//! `anyhow::Result` and is converted into a status transition plus a log
//! line at the supervisor boundary. `KernelError` is what crosses the
//! boundary the Facade and the registry loader expose to callers, so they
//! can match on the bucket instead of parsing a string.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KernelError {
    /// RTSP unreachable, HLS probe failed, child exited quickly with a
    /// non-zero status. Retried internally with backoff; surfaced here only
    /// when a synchronous caller (e.g. `start_recording`) needs to know the
    /// first attempt did not take.
    #[error("camera {camera_id}: transient upstream failure: {message}")]
    Transient { camera_id: String, message: String },

    /// Insufficient disk space, directory not writable. Start operations
    /// fail outright; existing workers are left untouched.
    #[error("camera {camera_id}: resource shortfall: {message}")]
    ResourceShortfall { camera_id: String, message: String },

    /// Duplicate camera id, malformed config line, conflicting config keys.
    #[error("policy violation: {message}")]
    PolicyViolation { message: String },

    /// Child alive but producing stale output; diagnosed by a watchdog.
    #[error("camera {camera_id}: child misbehavior: {message}")]
    ChildMisbehavior { camera_id: String, message: String },

    /// Filesystem errors during prune/finalize/repair. Logged, never fatal
    /// to the caller that triggered the sweep.
    #[error("infrastructural failure: {message}")]
    Infrastructural { message: String },

    /// The referenced camera id is not present in the registry.
    #[error("unknown camera id: {0}")]
    UnknownCamera(String),
}

impl KernelError {
    pub fn camera_id(&self) -> Option<&str> {
        match self {
            KernelError::Transient { camera_id, .. }
            | KernelError::ResourceShortfall { camera_id, .. }
            | KernelError::ChildMisbehavior { camera_id, .. } => Some(camera_id),
            KernelError::UnknownCamera(id) => Some(id),
            KernelError::PolicyViolation { .. } | KernelError::Infrastructural { .. } => None,
        }
    }
}

pub type KernelResult<T> = Result<T, KernelError>;
