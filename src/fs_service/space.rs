use std::path::{Path, PathBuf};

use sysinfo::Disks;
use tracing::debug;

/// Resolves `path` to its containing volume and returns free bytes. Falls
/// back to the parent directory, then the process working directory, if
/// the path itself cannot be resolved (spec §4.B).
pub fn free_bytes(path: &Path) -> anyhow::Result<u64> {
    let disks = Disks::new_with_refreshed_list();

    for candidate in resolution_candidates(path) {
        if let Some(free) = free_bytes_for_mount(&disks, &candidate) {
            debug!(path = %candidate.display(), free, "resolved disk free space");
            return Ok(free);
        }
    }

    anyhow::bail!("could not resolve any volume for {}", path.display())
}

fn resolution_candidates(path: &Path) -> Vec<PathBuf> {
    let mut candidates = vec![path.to_path_buf()];
    if let Some(parent) = path.parent() {
        candidates.push(parent.to_path_buf());
    }
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd);
    }
    candidates
}

fn free_bytes_for_mount(disks: &Disks, path: &Path) -> Option<u64> {
    let absolute = std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    disks
        .list()
        .iter()
        .filter(|disk| absolute.starts_with(disk.mount_point()))
        .max_by_key(|disk| disk.mount_point().as_os_str().len())
        .map(|disk| disk.available_space())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_bytes_resolves_existing_path() {
        let dir = tempfile::tempdir().unwrap();
        let free = free_bytes(dir.path());
        assert!(free.is_ok());
    }

    #[test]
    fn free_bytes_falls_back_to_parent_for_missing_child() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist-yet");
        let free = free_bytes(&missing);
        assert!(free.is_ok());
    }
}
