//! Transcoder Driver (spec §4.A): builds argument vectors for the external
//! media tool, probes upstream reachability, and owns the portable
//! spawn/terminate/kill lifecycle of transcoder child processes.

mod argv;
mod platform;
mod probe;
mod spawn;

pub use argv::{hls_recording_args, hls_streaming_args, rtsp_recording_args};
pub use probe::{probe_audio, probe_hls, probe_local_hls, probe_reachable};
pub use spawn::{SpawnedChild, any_transcoder_running, finalize, kill_all, scorched_earth_kill, spawn, terminate};
