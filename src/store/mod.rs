pub mod manifest;
pub mod playlist;
pub mod queue;

pub use manifest::{DownloadRecord, ManifestStore};
pub use playlist::{PlaylistEntry, PlaylistStore};
pub use queue::QueueStore;
