pub mod download;
pub mod filename;

pub use download::{DownloadOutcome, download_episode, episode_id};
pub use filename::{audio_extension, episode_filename};
