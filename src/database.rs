// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, info};

use crate::config::PARTIAL_SUFFIX;
use crate::error::DatabaseError;
use crate::model::{DatabaseState, Episode, EpisodeChange, EpisodeUpdate, EpisodeUri, Podcast};
use crate::updates::Persistence;

/// In-memory library state mirrored to a single snapshot file
#[derive(Debug)]
pub struct Database {
    path: PathBuf,
    state: DatabaseState,
}

impl Database {
    /// Load the snapshot at `path`; a missing file yields an empty library
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, DatabaseError> {
        let path = path.into();

        let state = match std::fs::read(&path) {
            Ok(bytes) => bincode::deserialize(&bytes).map_err(|e| DatabaseError::Corrupt {
                path: path.clone(),
                source: e,
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("No snapshot at {}, starting with an empty library", path.display());
                DatabaseState::default()
            }
            Err(e) => return Err(DatabaseError::ReadFailed { path, source: e }),
        };

        Ok(Self { path, state })
    }

    /// An empty library that will be written to `path`
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: DatabaseState::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &DatabaseState {
        &self.state
    }

    /// Overwrite the snapshot with the whole current state
    ///
    /// The bytes go to a sibling `.partial` file first and are renamed into
    /// place, so a crash mid-write leaves the previous snapshot intact.
    pub fn save(&self) -> Result<(), DatabaseError> {
        let bytes = bincode::serialize(&self.state).map_err(DatabaseError::EncodeFailed)?;

        let mut partial = self.path.clone().into_os_string();
        partial.push(PARTIAL_SUFFIX);
        let partial = PathBuf::from(partial);

        std::fs::write(&partial, &bytes).map_err(|e| DatabaseError::WriteFailed {
            path: partial.clone(),
            source: e,
        })?;
        std::fs::rename(&partial, &self.path).map_err(|e| DatabaseError::WriteFailed {
            path: self.path.clone(),
            source: e,
        })?;

        debug!("Saved snapshot ({} bytes) to {}", bytes.len(), self.path.display());
        Ok(())
    }

    /// Linear search in podcast order, then episode order
    pub fn find_episode(&self, uri: &EpisodeUri) -> Option<&Episode> {
        self.state
            .podcasts
            .iter()
            .find(|p| p.podcast_uri == uri.podcast_uri)?
            .episodes
            .iter()
            .find(|e| e.episode_uri == uri.episode_uri)
    }

    fn find_episode_mut(&mut self, uri: &EpisodeUri) -> Option<&mut Episode> {
        self.state
            .podcasts
            .iter_mut()
            .find(|p| p.podcast_uri == uri.podcast_uri)?
            .episodes
            .iter_mut()
            .find(|e| e.episode_uri == uri.episode_uri)
    }

    /// Overwrite the one field named by the update; unknown episodes are ignored
    pub fn apply_update(&mut self, update: &EpisodeUpdate) {
        let Some(episode) = self.find_episode_mut(&update.uri) else {
            debug!(
                "Ignoring update for unknown episode {} / {}",
                update.uri.podcast_uri, update.uri.episode_uri
            );
            return;
        };

        match &update.change {
            EpisodeChange::NewDownloadStatus(status) => episode.download_status = *status,
            EpisodeChange::NewDownloadProgress(progress) => episode.download_progress = *progress,
            EpisodeChange::NewPlaybackStatus(status) => episode.playback_status = *status,
            EpisodeChange::NewPlaybackProgress(elapsed_ms) => {
                episode.playback_progress.elapsed_ms = *elapsed_ms;
            }
            EpisodeChange::NewPlaybackDuration(total_ms) => {
                episode.playback_progress.total_ms = *total_ms;
            }
        }
    }

    /// Merge a freshly parsed podcast and return the episodes to download
    ///
    /// Known episodes keep their local status and only take the feed fields.
    /// New episodes of a known podcast are all returned; a podcast seen for
    /// the first time only contributes its most recent episode.
    pub fn save_podcast(&mut self, refreshed: Podcast) -> Vec<EpisodeUri> {
        let Some(podcast) = self
            .state
            .podcasts
            .iter_mut()
            .find(|p| p.podcast_uri == refreshed.podcast_uri)
        else {
            let to_download = refreshed
                .episodes
                .last()
                .map(|latest| EpisodeUri::new(&refreshed.podcast_uri, &latest.episode_uri))
                .into_iter()
                .collect();
            self.state.podcasts.push(refreshed);
            return to_download;
        };

        if !refreshed.title.is_empty() {
            podcast.title = refreshed.title;
        }

        let mut to_download = Vec::new();
        for episode in refreshed.episodes {
            match podcast
                .episodes
                .iter_mut()
                .find(|e| e.episode_uri == episode.episode_uri)
            {
                Some(existing) => existing.merge_from_feed(&episode),
                None => {
                    to_download.push(EpisodeUri::new(&podcast.podcast_uri, &episode.episode_uri));
                    podcast.episodes.push(episode);
                }
            }
        }
        to_download
    }
}

/// The database behind its own lock, shared by the update pipeline,
/// playback and the service
#[derive(Debug, Clone)]
pub struct SharedDatabase {
    inner: Arc<Mutex<Database>>,
}

impl SharedDatabase {
    pub fn new(database: Database) -> Self {
        Self {
            inner: Arc::new(Mutex::new(database)),
        }
    }

    /// Every mutation leaves the database consistent, so a poisoned lock is still usable
    pub fn lock(&self) -> MutexGuard<'_, Database> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> DatabaseState {
        self.lock().state().clone()
    }

    pub fn find_episode(&self, uri: &EpisodeUri) -> Option<Episode> {
        self.lock().find_episode(uri).cloned()
    }

    /// Apply an update and, if requested, write the snapshot
    ///
    /// The write is a plain blocking `std::fs` call under the database lock.
    /// It runs on whatever thread enqueued the update, including runtime
    /// workers: the snapshot is small, and `block_in_place` would panic on a
    /// current-thread runtime. Transient updates never touch the disk, so
    /// per-chunk download progress stays off this path.
    pub fn apply(&self, update: &EpisodeUpdate, persistence: Persistence) {
        let mut database = self.lock();
        database.apply_update(update);
        if persistence == Persistence::Persist
            && let Err(e) = database.save()
        {
            error!("Failed to persist library: {}", e);
        }
    }

    /// Forget every podcast; the snapshot is left to the next persist
    pub fn reset(&self) {
        let mut database = self.lock();
        let path = database.path().to_path_buf();
        *database = Database::empty(path);
    }

    /// Write the snapshot, logging failures
    pub fn persist(&self) {
        if let Err(e) = self.lock().save() {
            error!("Failed to persist library: {}", e);
        }
    }
}
