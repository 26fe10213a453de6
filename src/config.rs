// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::download::download_filename;
use crate::error::ConfigError;

pub const SNAPSHOT_FILENAME: &str = "library.bin";
pub const FEED_LIST_FILENAME: &str = "feeds.txt";

/// Suffix of files that are still being written
pub const PARTIAL_SUFFIX: &str = ".partial";

const FEED_LIST_TEMPLATE: &str = "\
# Feeds to subscribe to, one per line. Lines starting with '#' are ignored.
# https://feeds.example.com/some-show.xml
# /home/me/podcasts/local-feed.xml
";

/// Tunables for the service
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    /// Number of most recent episodes kept from each feed per refresh
    pub max_episodes_per_podcast: usize,
    /// Every n-th playback tick is persisted to disk
    pub checkpoint_every: u64,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            max_episodes_per_podcast: 10,
            checkpoint_every: 60,
        }
    }
}

/// Layout of the data directory: snapshot, feed list and downloaded media
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Use `root` as the data directory, creating it if needed
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let root = root.into();
        if !root.exists() {
            std::fs::create_dir_all(&root).map_err(|e| ConfigError::CreateDirectoryFailed {
                path: root.clone(),
                source: e,
            })?;
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn snapshot_path(&self) -> PathBuf {
        self.root.join(SNAPSHOT_FILENAME)
    }

    pub fn feed_list_path(&self) -> PathBuf {
        self.root.join(FEED_LIST_FILENAME)
    }

    /// Where the media of `episode_uri` lives once downloaded
    pub fn media_path(&self, episode_uri: &str) -> PathBuf {
        self.root.join(download_filename(episode_uri))
    }

    /// Files the service owns besides downloaded media
    pub fn is_reserved(&self, filename: &str) -> bool {
        filename == SNAPSHOT_FILENAME
            || filename == FEED_LIST_FILENAME
            || filename.ends_with(PARTIAL_SUFFIX)
    }

    /// Read the feed list, writing a commented template first if it is missing
    pub fn load_feeds(&self) -> Result<Vec<String>, ConfigError> {
        let path = self.feed_list_path();

        if !path.exists() {
            info!("Creating feed list template at {}", path.display());
            std::fs::write(&path, FEED_LIST_TEMPLATE).map_err(|e| ConfigError::WriteFailed {
                path: path.clone(),
                source: e,
            })?;
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::ReadFailed { path, source: e })?;

        Ok(parse_feed_list(&content))
    }
}

/// One feed source per line; blank lines and `#` comments are skipped
pub fn parse_feed_list(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect()
}
