//! Recording Supervisor (spec §4.E): produces a continuous sequence of
//! capped MP4 archives per camera.

mod spawner;
mod state;
mod supervisor;

pub use state::{DiskShortfall, RecordingPhase, RecordingStatus, SourceKind};
pub use supervisor::RecordingSupervisor;
