pub mod config;
pub mod episode;
pub mod error;
pub mod feed;
pub mod http;
pub mod player;
pub mod progress;
pub mod store;

// Re-export main types for convenience
pub use config::PodFile;
pub use episode::{DownloadOutcome, download_episode, episode_filename, episode_id};
pub use error::{ConfigError, DownloadError, FeedError, PlayerError, StoreError};
pub use feed::{Enclosure, Episode, Podcast, fetch_feed};
pub use http::{HttpClient, HttpResponse, ReqwestClient};
pub use player::{PlaybackOutcome, PlayerOptions, play_entry, play_playlist};
pub use progress::{NoopReporter, ProgressEvent, ProgressReporter, SharedProgressReporter};
pub use store::{DownloadRecord, ManifestStore, PlaylistEntry, PlaylistStore, QueueStore};
