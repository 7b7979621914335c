pub mod fetch;
pub mod parse;

pub use fetch::fetch_feed;
pub use parse::{Enclosure, Episode, Podcast, parse_feed};
