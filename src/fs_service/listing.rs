use std::path::Path;

use chrono::NaiveDateTime;
use tracing::warn;

use crate::status::ArchiveEntry;

/// Enumerates `<root>/<camera_id>/*.mp4` for every camera directory under
/// `root`, parsing the 14-digit timestamp embedded in each filename.
/// Entries whose filename does not match the `<id>_<14 digits>.mp4` shape
/// are skipped with a logged warning rather than failing the whole listing
/// (spec SPEC_FULL.md §4.I).
pub fn list_archives(root: &Path) -> anyhow::Result<Vec<ArchiveEntry>> {
    let mut entries = Vec::new();

    let Ok(camera_dirs) = std::fs::read_dir(root) else {
        return Ok(entries);
    };

    for camera_dir in camera_dirs.flatten() {
        let camera_path = camera_dir.path();
        if !camera_path.is_dir() {
            continue;
        }
        let camera_id = camera_dir.file_name().to_string_lossy().into_owned();

        let Ok(files) = std::fs::read_dir(&camera_path) else { continue };
        for file in files.flatten() {
            let path = file.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("mp4") {
                continue;
            }
            let Some(file_name) = path.file_name().and_then(|name| name.to_str()) else { continue };

            match parse_archive_timestamp(file_name, &camera_id) {
                Some(started_at) => {
                    let file_name = file_name.to_string();
                    let size_bytes = file.metadata().map(|meta| meta.len()).unwrap_or(0);
                    entries.push(ArchiveEntry { camera_id: camera_id.clone(), path, file_name, started_at, size_bytes });
                }
                None => warn!(file_name, "skipping archive with unparseable filename"),
            }
        }
    }

    entries.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    Ok(entries)
}

/// Parses `<camera_id>_<YYYYMMDDHHMMSS>.mp4` per spec §6's filename
/// temporal format.
fn parse_archive_timestamp(file_name: &str, camera_id: &str) -> Option<NaiveDateTime> {
    let prefix = format!("{camera_id}_");
    let stem = file_name.strip_prefix(&prefix)?.strip_suffix(".mp4")?;
    if stem.len() != 14 || !stem.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    NaiveDateTime::parse_from_str(stem, "%Y%m%d%H%M%S").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn list_archives_parses_well_formed_entries_and_sorts_descending() {
        let root = tempfile::tempdir().unwrap();
        let cam_dir = root.path().join("cam1");
        fs::create_dir_all(&cam_dir).unwrap();
        touch(&cam_dir.join("cam1_20260101010101.mp4"));
        touch(&cam_dir.join("cam1_20260101020202.mp4"));

        let entries = list_archives(root.path()).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries[0].started_at > entries[1].started_at);
        assert_eq!(entries[0].camera_id, "cam1");
    }

    #[test]
    fn list_archives_skips_malformed_filenames() {
        let root = tempfile::tempdir().unwrap();
        let cam_dir = root.path().join("cam1");
        fs::create_dir_all(&cam_dir).unwrap();
        touch(&cam_dir.join("cam1_not-a-timestamp.mp4"));
        touch(&cam_dir.join("cam1_20260101010101.mp4"));

        let entries = list_archives(root.path()).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn list_archives_returns_empty_for_missing_root() {
        let entries = list_archives(Path::new("/does/not/exist")).unwrap();
        assert!(entries.is_empty());
    }
}
