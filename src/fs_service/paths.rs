use std::path::{Path, PathBuf};

use chrono::Local;

/// Idempotent directory creation. On non-Windows sets a permissive mode,
/// then probes writability by creating and deleting a marker file.
pub fn ensure_dir(path: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = std::fs::metadata(path)?.permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(path, perms)?;
    }

    let marker = path.join(".write_probe");
    std::fs::write(&marker, b"")
        .map_err(|err| anyhow::anyhow!("directory {} is not writable: {err}", path.display()))?;
    std::fs::remove_file(&marker)?;
    Ok(())
}

/// Archive path per spec §3 invariant 3:
/// `<record_root>/<camera_id>/<camera_id>_<YYYYMMDDHHMMSS>.mp4`. Creates
/// the camera subdirectory if absent.
pub fn archive_path(root: &Path, camera_id: &str) -> anyhow::Result<PathBuf> {
    let dir = root.join(camera_id);
    ensure_dir(&dir)?;
    let timestamp = Local::now().format("%Y%m%d%H%M%S");
    Ok(dir.join(format!("{camera_id}_{timestamp}.mp4")))
}

/// Playlist path per spec §3 invariant 4: `<tmp_root>/<camera_id>/<camera_id>.m3u8`.
pub fn playlist_path(tmp_root: &Path, camera_id: &str) -> PathBuf {
    tmp_root.join(camera_id).join(format!("{camera_id}.m3u8"))
}

/// Segment filename pattern in the same directory as the playlist.
pub fn segment_pattern(tmp_root: &Path, camera_id: &str) -> PathBuf {
    tmp_root.join(camera_id).join(format!("{camera_id}_%03d.ts"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_path_matches_invariant_3_shape() {
        let dir = tempfile::tempdir().unwrap();
        let path = archive_path(dir.path(), "cam1").unwrap();
        let file_name = path.file_name().unwrap().to_str().unwrap();
        assert!(file_name.starts_with("cam1_"));
        assert!(file_name.ends_with(".mp4"));
        let ts = &file_name["cam1_".len()..file_name.len() - ".mp4".len()];
        assert_eq!(ts.len(), 14);
        assert!(ts.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn playlist_and_segment_paths_share_camera_directory() {
        let tmp_root = Path::new("/tmp_root");
        let playlist = playlist_path(tmp_root, "cam1");
        let segments = segment_pattern(tmp_root, "cam1");
        assert_eq!(playlist.parent(), segments.parent());
        assert_eq!(playlist.file_name().unwrap(), "cam1.m3u8");
        assert_eq!(segments.file_name().unwrap(), "cam1_%03d.ts");
    }

    #[test]
    fn ensure_dir_is_idempotent_and_writable() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        ensure_dir(&nested).unwrap();
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
