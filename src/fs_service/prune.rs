use std::path::Path;
use std::time::{Duration, SystemTime};

const SUSPECT_SIZE_BYTES: u64 = 1024;

/// Deletes files with the given `suffix` older than `max_age_s` and, of the
/// survivors, deletes the oldest so the count is at most `max_files`.
/// Files smaller than 1 KiB are always deleted first as suspect. Returns
/// the number of files deleted (spec §4.B).
pub fn prune(dir: &Path, suffix: &str, max_age_s: Option<u64>, max_files: Option<usize>) -> anyhow::Result<usize> {
    let mut entries: Vec<(std::path::PathBuf, SystemTime, u64)> = Vec::new();
    let read_dir = match std::fs::read_dir(dir) {
        Ok(read_dir) => read_dir,
        Err(_) => return Ok(0),
    };

    for entry in read_dir.flatten() {
        let path = entry.path();
        if !path.is_file() || !path.to_string_lossy().ends_with(suffix) {
            continue;
        }
        let Ok(metadata) = entry.metadata() else { continue };
        let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        entries.push((path, modified, metadata.len()));
    }

    let mut deleted = 0usize;
    let now = SystemTime::now();

    entries.retain(|(path, _modified, size)| {
        if *size < SUSPECT_SIZE_BYTES {
            let _ = std::fs::remove_file(path);
            deleted += 1;
            false
        } else {
            true
        }
    });

    if let Some(max_age_s) = max_age_s {
        let max_age = Duration::from_secs(max_age_s);
        entries.retain(|(path, modified, _size)| {
            let age = now.duration_since(*modified).unwrap_or(Duration::ZERO);
            if age > max_age {
                let _ = std::fs::remove_file(path);
                deleted += 1;
                false
            } else {
                true
            }
        });
    }

    if let Some(max_files) = max_files
        && entries.len() > max_files
    {
        entries.sort_by_key(|(_path, modified, _size)| *modified);
        let overflow = entries.len() - max_files;
        for (path, _modified, _size) in entries.drain(..overflow) {
            let _ = std::fs::remove_file(&path);
            deleted += 1;
        }
    }

    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use std::time::Duration as StdDuration;

    fn touch(path: &Path, size: usize) {
        let mut file = fs::File::create(path).unwrap();
        file.write_all(&vec![b'a'; size]).unwrap();
    }

    #[test]
    fn prune_deletes_suspect_small_files_regardless_of_age() {
        let dir = tempfile::tempdir().unwrap();
        let small = dir.path().join("a.mp4");
        touch(&small, 10);
        let deleted = prune(dir.path(), ".mp4", None, None).unwrap();
        assert_eq!(deleted, 1);
        assert!(!small.exists());
    }

    #[test]
    fn prune_caps_survivor_count_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            let path = dir.path().join(format!("f{i}.mp4"));
            touch(&path, 2048);
            std::thread::sleep(StdDuration::from_millis(5));
        }
        let deleted = prune(dir.path(), ".mp4", None, Some(2)).unwrap();
        assert_eq!(deleted, 3);
        let remaining: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(remaining.len(), 2);
    }

    #[test]
    fn prune_ignores_files_without_matching_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let other = dir.path().join("notes.txt");
        touch(&other, 2048);
        let deleted = prune(dir.path(), ".mp4", None, Some(0)).unwrap();
        assert_eq!(deleted, 0);
        assert!(other.exists());
    }
}
