// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Library data model shared by the database, the update pipeline and the
//! RPC surface.
//!
//! Everything here is persisted with bincode, so none of these types may use
//! `skip_serializing_if` or `flatten`.

use std::mem::Discriminant;

use serde::{Deserialize, Serialize};

/// Identifies an episode within the library
///
/// The episode URI is the media (enclosure) URI of the episode, so it doubles
/// as the download source.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EpisodeUri {
    pub podcast_uri: String,
    pub episode_uri: String,
}

impl EpisodeUri {
    pub fn new(podcast_uri: impl Into<String>, episode_uri: impl Into<String>) -> Self {
        Self {
            podcast_uri: podcast_uri.into(),
            episode_uri: episode_uri.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    #[default]
    NotDownloaded,
    InProgress,
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackStatus {
    #[default]
    NotPlaying,
    Playing,
    Paused,
}

/// Bytes transferred so far; only meaningful while a download is in progress
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaybackProgress {
    pub elapsed_ms: u64,
    pub total_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub episode_uri: String,
    pub title: String,
    pub description_short: String,
    pub description_long: String,
    pub download_status: DownloadStatus,
    pub download_progress: DownloadProgress,
    pub playback_status: PlaybackStatus,
    pub playback_progress: PlaybackProgress,
}

impl Episode {
    /// Overwrite the fields that come from the feed, keeping local status
    pub fn merge_from_feed(&mut self, refreshed: &Episode) {
        self.title.clone_from(&refreshed.title);
        self.description_short.clone_from(&refreshed.description_short);
        self.description_long.clone_from(&refreshed.description_long);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Podcast {
    pub podcast_uri: String,
    pub title: String,
    /// Oldest first; the last entry is the most recent episode
    pub episodes: Vec<Episode>,
}

/// The unit of persistence
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseState {
    pub podcasts: Vec<Podcast>,
}

/// A single-field delta for one episode
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodeChange {
    NewDownloadStatus(DownloadStatus),
    NewDownloadProgress(DownloadProgress),
    NewPlaybackStatus(PlaybackStatus),
    /// Elapsed position in milliseconds
    NewPlaybackProgress(u64),
    /// Total duration in milliseconds
    NewPlaybackDuration(u64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeUpdate {
    pub uri: EpisodeUri,
    pub change: EpisodeChange,
}

impl EpisodeUpdate {
    pub fn download_status(uri: &EpisodeUri, status: DownloadStatus) -> Self {
        Self::new(uri, EpisodeChange::NewDownloadStatus(status))
    }

    pub fn download_progress(uri: &EpisodeUri, downloaded_bytes: u64, total_bytes: u64) -> Self {
        Self::new(
            uri,
            EpisodeChange::NewDownloadProgress(DownloadProgress {
                downloaded_bytes,
                total_bytes,
            }),
        )
    }

    pub fn playback_status(uri: &EpisodeUri, status: PlaybackStatus) -> Self {
        Self::new(uri, EpisodeChange::NewPlaybackStatus(status))
    }

    pub fn playback_progress(uri: &EpisodeUri, elapsed_ms: u64) -> Self {
        Self::new(uri, EpisodeChange::NewPlaybackProgress(elapsed_ms))
    }

    pub fn playback_duration(uri: &EpisodeUri, total_ms: u64) -> Self {
        Self::new(uri, EpisodeChange::NewPlaybackDuration(total_ms))
    }

    fn new(uri: &EpisodeUri, change: EpisodeChange) -> Self {
        Self {
            uri: uri.clone(),
            change,
        }
    }

    /// The mutation kind, ignoring the carried value
    pub fn kind(&self) -> Discriminant<EpisodeChange> {
        std::mem::discriminant(&self.change)
    }

    /// Whether `other` targets the same episode field and therefore supersedes this one
    pub fn is_superseded_by(&self, other: &EpisodeUpdate) -> bool {
        self.uri == other.uri && self.kind() == other.kind()
    }
}
