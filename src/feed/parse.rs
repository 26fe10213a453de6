// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::collections::HashSet;

use tracing::debug;

use crate::error::FeedError;
use crate::model::{Episode, Podcast};

use super::description::parse_description;

/// Parse RSS feed XML bytes into a podcast keyed by `podcast_uri`
///
/// Feeds list the newest item first; the first `max_episodes` items that
/// carry an enclosure are kept and stored oldest first, so the last episode
/// of the result is the most recent one.
pub fn parse_feed(
    xml_bytes: &[u8],
    podcast_uri: &str,
    max_episodes: usize,
) -> Result<Podcast, FeedError> {
    let channel = rss::Channel::read_from(xml_bytes)?;

    let mut seen = HashSet::new();
    let mut episodes: Vec<Episode> = channel
        .items()
        .iter()
        .filter_map(parse_episode)
        .filter(|episode| seen.insert(episode.episode_uri.clone()))
        .take(max_episodes)
        .collect();
    episodes.reverse();

    Ok(Podcast {
        podcast_uri: podcast_uri.to_string(),
        title: channel.title().to_string(),
        episodes,
    })
}

fn parse_episode(item: &rss::Item) -> Option<Episode> {
    let title = item
        .title()
        .map(String::from)
        .unwrap_or_else(|| "Untitled Episode".to_string());

    let Some(enclosure) = item.enclosure().filter(|e| !e.url().is_empty()) else {
        debug!("Skipping '{}': no enclosure", title);
        return None;
    };

    let raw_description = item
        .description()
        .or_else(|| item.content())
        .or_else(|| item.itunes_ext().and_then(|ext| ext.summary()))
        .unwrap_or_default();
    let description = parse_description(raw_description);

    Some(Episode {
        episode_uri: enclosure.url().to_string(),
        title,
        description_short: description.short,
        description_long: description.long,
        ..Default::default()
    })
}
