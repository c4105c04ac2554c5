//! Bit-exact argument vector builders (spec §4.A). These are observable
//! output — keep flag order and values aligned with the spec text rather
//! than "cleaning them up".

use std::path::Path;

/// HLS streaming: copy both codecs, 2s segments, 5-segment window, delete
/// old segments as they roll off.
pub fn hls_streaming_args(rtsp_url: &str, playlist_path: &Path, segment_pattern: &Path) -> Vec<String> {
    vec![
        "-rtsp_transport".to_string(),
        "tcp".to_string(),
        "-i".to_string(),
        rtsp_url.to_string(),
        "-c:v".to_string(),
        "copy".to_string(),
        "-c:a".to_string(),
        "copy".to_string(),
        "-f".to_string(),
        "hls".to_string(),
        "-hls_time".to_string(),
        "2".to_string(),
        "-hls_list_size".to_string(),
        "5".to_string(),
        "-hls_flags".to_string(),
        "delete_segments".to_string(),
        "-hls_segment_filename".to_string(),
        segment_pattern.to_string_lossy().into_owned(),
        playlist_path.to_string_lossy().into_owned(),
    ]
}

/// RTSP recording: reconnecting TCP input, video copy, audio transcoded to
/// AAC 96k/44.1k stereo, fast-start output, overwrite.
pub fn rtsp_recording_args(rtsp_url: &str, has_audio: bool, output_path: &Path) -> Vec<String> {
    let mut args = vec![
        "-rtsp_transport".to_string(),
        "tcp".to_string(),
        "-use_wallclock_as_timestamps".to_string(),
        "1".to_string(),
        "-reset_timestamps".to_string(),
        "1".to_string(),
        "-reconnect".to_string(),
        "1".to_string(),
        "-reconnect_at_eof".to_string(),
        "1".to_string(),
        "-reconnect_streamed".to_string(),
        "1".to_string(),
        "-reconnect_delay_max".to_string(),
        "2".to_string(),
        "-thread_queue_size".to_string(),
        "1024".to_string(),
        "-i".to_string(),
        rtsp_url.to_string(),
        "-c:v".to_string(),
        "copy".to_string(),
    ];
    if has_audio {
        args.extend(
            [
                "-c:a", "aac", "-b:a", "96k", "-ar", "44100", "-ac", "2", "-async", "1",
            ]
            .map(str::to_string),
        );
    } else {
        args.push("-an".to_string());
    }
    args.extend(
        [
            "-max_delay", "500000", "-movflags", "+faststart", "-y",
        ]
        .map(str::to_string),
    );
    args.push(output_path.to_string_lossy().into_owned());
    args
}

/// HLS recording fallback: input is this camera's own local playlist,
/// video copy, audio transcoded to AAC 128k, fragmented fast-start.
pub fn hls_recording_args(playlist_url: &str, output_path: &Path) -> Vec<String> {
    vec![
        "-protocol_whitelist".to_string(),
        "file,http,https,tcp,tls".to_string(),
        "-fflags".to_string(),
        "+igndts+discardcorrupt".to_string(),
        "-avoid_negative_ts".to_string(),
        "make_zero".to_string(),
        "-max_muxing_queue_size".to_string(),
        "2048".to_string(),
        "-i".to_string(),
        playlist_url.to_string(),
        "-c:v".to_string(),
        "copy".to_string(),
        "-c:a".to_string(),
        "aac".to_string(),
        "-b:a".to_string(),
        "128k".to_string(),
        "-vsync".to_string(),
        "cfr".to_string(),
        "-movflags".to_string(),
        "+frag_keyframe+empty_moov+faststart".to_string(),
        "-y".to_string(),
        output_path.to_string_lossy().into_owned(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn hls_streaming_args_use_tcp_transport_and_2s_segments() {
        let args = hls_streaming_args(
            "rtsp://cam1",
            &PathBuf::from("/tmp/cam1/cam1.m3u8"),
            &PathBuf::from("/tmp/cam1/cam1_%03d.ts"),
        );
        assert_eq!(args[0], "-rtsp_transport");
        assert_eq!(args[1], "tcp");
        assert!(args.contains(&"delete_segments".to_string()));
        assert_eq!(args.last().unwrap(), "/tmp/cam1/cam1.m3u8");
    }

    #[test]
    fn rtsp_recording_args_drop_audio_branch_without_audio() {
        let args = rtsp_recording_args("rtsp://cam1", false, &PathBuf::from("out.mp4"));
        assert!(args.contains(&"-an".to_string()));
        assert!(!args.contains(&"aac".to_string()));
    }

    #[test]
    fn rtsp_recording_args_include_aac_branch_with_audio() {
        let args = rtsp_recording_args("rtsp://cam1", true, &PathBuf::from("out.mp4"));
        assert!(args.contains(&"aac".to_string()));
        assert!(args.contains(&"96k".to_string()));
    }

    #[test]
    fn hls_recording_args_whitelist_local_protocols() {
        let args = hls_recording_args("http://localhost/tmp/cam1/cam1.m3u8", &PathBuf::from("out.mp4"));
        assert!(args.contains(&"file,http,https,tcp,tls".to_string()));
        assert!(args.contains(&"128k".to_string()));
    }
}
