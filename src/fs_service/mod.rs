//! Filesystem Service (spec §4.B): directory hygiene, archive path
//! generation, pruning, and MP4 tail repair.

mod listing;
mod paths;
mod prune;
mod repair;
mod space;

pub use listing::list_archives;
pub use paths::{archive_path, ensure_dir, playlist_path, segment_pattern};
pub use prune::prune;
pub use repair::repair_mp4;
pub use space::free_bytes;
