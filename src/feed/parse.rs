// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, FixedOffset};
use url::Url;

use crate::error::FeedError;

/// Represents a parsed podcast feed
#[derive(Debug, Clone)]
pub struct Podcast {
    pub title: String,
    pub description: Option<String>,
    pub feed_url: Url,
    pub episodes: Vec<Episode>,
}

/// Represents a single podcast episode
#[derive(Debug, Clone)]
pub struct Episode {
    pub title: String,
    pub description: Option<String>,
    pub pub_date: Option<DateTime<FixedOffset>>,
    pub enclosure: Enclosure,
    pub duration: Option<String>,
}

/// Represents the audio file attached to an episode
#[derive(Debug, Clone)]
pub struct Enclosure {
    pub url: Url,
    pub mime_type: Option<String>,
}

/// Parse RSS feed XML bytes into a Podcast struct.
///
/// Episodes keep document order. Items without an enclosure URL are
/// skipped since there is nothing to download.
pub fn parse_feed(xml_bytes: &[u8], feed_url: Url) -> Result<Podcast, FeedError> {
    let channel = rss::Channel::read_from(xml_bytes)?;

    let episodes = channel
        .items()
        .iter()
        .filter_map(parse_episode)
        .collect();

    Ok(Podcast {
        title: channel.title().to_string(),
        description: Some(channel.description().to_string()).filter(|s| !s.is_empty()),
        feed_url,
        episodes,
    })
}

fn parse_episode(item: &rss::Item) -> Option<Episode> {
    let enclosure = item.enclosure()?;
    let enclosure_url = Url::parse(enclosure.url()).ok()?;

    let title = item
        .title()
        .map(String::from)
        .unwrap_or_else(|| "Untitled Episode".to_string());

    let pub_date = item.pub_date().and_then(|date_str| {
        DateTime::parse_from_rfc2822(date_str)
            .or_else(|_| parse_relaxed_date(date_str))
            .ok()
    });

    Some(Episode {
        title,
        description: item.description().map(String::from),
        pub_date,
        enclosure: Enclosure {
            url: enclosure_url,
            mime_type: Some(enclosure.mime_type().to_string()).filter(|s| !s.is_empty()),
        },
        duration: item
            .itunes_ext()
            .and_then(|ext| ext.duration().map(String::from)),
    })
}

/// Try to parse dates that don't strictly conform to RFC 2822
fn parse_relaxed_date(date_str: &str) -> Result<DateTime<FixedOffset>, chrono::ParseError> {
    let formats = [
        "%a, %d %b %Y %H:%M:%S %z",
        "%Y-%m-%dT%H:%M:%S%:z",
        "%Y-%m-%d %H:%M:%S %z",
    ];

    for format in formats {
        if let Ok(dt) = DateTime::parse_from_str(date_str, format) {
            return Ok(dt);
        }
    }

    Err(chrono::DateTime::parse_from_rfc2822("invalid").unwrap_err())
}
