//! Shared test-only helpers: serializing access to process-wide env vars
//! across tests that set them, and locating the mock transcoder binary
//! built as this crate's `mock_ffmpeg` test target.

use std::ffi::{OsStr, OsString};
use std::sync::{Mutex, MutexGuard, OnceLock};

static ENV_MUTEX: OnceLock<Mutex<()>> = OnceLock::new();

pub fn env_lock() -> MutexGuard<'static, ()> {
    ENV_MUTEX.get_or_init(|| Mutex::new(())).lock().unwrap_or_else(|err| err.into_inner())
}

pub fn set_env<K: AsRef<OsStr>, V: AsRef<OsStr>>(key: K, value: V) {
    unsafe { std::env::set_var(key, value) }
}

pub fn remove_env<K: AsRef<OsStr>>(key: K) {
    unsafe { std::env::remove_var(key) }
}

pub struct EnvVarGuard {
    prev: Vec<(String, Option<OsString>)>,
}

impl EnvVarGuard {
    pub fn capture<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let prev = keys.into_iter().map(|k| (k.as_ref().to_string(), std::env::var_os(k.as_ref()))).collect();
        Self { prev }
    }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        for (key, value) in self.prev.drain(..) {
            match value {
                Some(v) => set_env(&key, v),
                None => remove_env(&key),
            }
        }
    }
}

/// Finds the `mock_ffmpeg` test binary built alongside this crate's own
/// test binary: they land in the same `target/.../deps` directory, so the
/// running test's own executable path is enough to locate it without a
/// hardcoded profile path.
pub fn locate_mock_ffmpeg_exe() -> std::path::PathBuf {
    if let Ok(current_exe) = std::env::current_exe()
        && let Some(deps_dir) = current_exe.parent()
        && deps_dir.exists()
    {
        let mut candidates: Vec<(std::path::PathBuf, Option<std::time::SystemTime>)> = std::fs::read_dir(deps_dir)
            .into_iter()
            .flatten()
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name().and_then(|name| name.to_str()).is_some_and(|name| name.starts_with("mock_ffmpeg"))
            })
            .filter(|path| {
                path.is_file()
                    && if cfg!(windows) {
                        path.extension().and_then(|ext| ext.to_str()).is_some_and(|ext| ext.eq_ignore_ascii_case("exe"))
                    } else {
                        path.extension().is_none()
                    }
            })
            .map(|path| {
                let modified = std::fs::metadata(&path).ok().and_then(|meta| meta.modified().ok());
                (path, modified)
            })
            .collect();
        candidates.sort_by_key(|(path, modified)| (*modified, path.clone()));
        if let Some((path, _)) = candidates.pop() {
            return path;
        }
    }

    panic!("unable to locate the mock_ffmpeg test binary; run `cargo test` so it is built first");
}
