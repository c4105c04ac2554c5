//! Stream Supervisor (spec §4.D): maintains a continuously-updating HLS
//! playlist per camera.

mod spawner;
mod state;
mod supervisor;

pub use state::{StreamPhase, StreamStatus};
pub use supervisor::StreamSupervisor;
