// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use tracing::{debug, info, warn};

use crate::config::DataDir;
use crate::database::SharedDatabase;
use crate::model::{EpisodeUpdate, EpisodeUri, PlaybackStatus};
use crate::updates::{Persistence, SharedUpdateSink};

use super::backend::AudioBackend;

/// Owns the single audio session of the library
///
/// Idle when nothing is loaded, otherwise playing or paused the loaded
/// episode. Requests that do not match the in-memory session are treated as
/// recovery from a previous process that died without cleaning up.
pub struct PlaybackController {
    backend: Box<dyn AudioBackend>,
    session: Option<EpisodeUri>,
    sink: SharedUpdateSink,
    database: SharedDatabase,
    data_dir: DataDir,
    ticks: u64,
    checkpoint_every: u64,
}

impl PlaybackController {
    pub fn new(
        backend: Box<dyn AudioBackend>,
        sink: SharedUpdateSink,
        database: SharedDatabase,
        data_dir: DataDir,
        checkpoint_every: u64,
    ) -> Self {
        Self {
            backend,
            session: None,
            sink,
            database,
            data_dir,
            ticks: 0,
            checkpoint_every: checkpoint_every.max(1),
        }
    }

    /// Load `uri` and play it from its last saved position
    ///
    /// Whatever was loaded before is saved and unloaded first. If the episode
    /// is unknown or its media cannot be loaded the controller stays idle.
    pub fn play(&mut self, uri: &EpisodeUri) {
        self.unload_current();

        let Some(episode) = self.database.find_episode(uri) else {
            debug!("Cannot play unknown episode {}", uri.episode_uri);
            return;
        };

        let path = self.data_dir.media_path(&uri.episode_uri);
        if let Err(e) = self.backend.load(&path) {
            warn!("Cannot play {}: {}", uri.episode_uri, e);
            return;
        }

        info!("Playing {}", episode.title);
        self.backend.play();
        self.session = Some(uri.clone());
        self.emit(EpisodeUpdate::playback_status(uri, PlaybackStatus::Playing));

        let progress = episode.playback_progress;
        if progress.elapsed_ms > 0 {
            self.backend.seek(progress.elapsed_ms);
        }
        if progress.total_ms == 0
            && let Some(duration) = self.backend.duration_ms()
        {
            self.emit(EpisodeUpdate::playback_duration(uri, duration));
        }
    }

    pub fn pause(&mut self, uri: &EpisodeUri) {
        if !self.is_loaded(uri) {
            return;
        }
        self.emit(EpisodeUpdate::playback_progress(
            uri,
            self.backend.position_ms(),
        ));
        self.backend.pause();
        self.emit(EpisodeUpdate::playback_status(uri, PlaybackStatus::Paused));
    }

    pub fn resume(&mut self, uri: &EpisodeUri) {
        if self.is_loaded(uri) {
            self.backend.resume();
            self.emit(EpisodeUpdate::playback_status(uri, PlaybackStatus::Playing));
        } else {
            // Paused when the last process went away, or another episode
            // took over since
            self.play(uri);
        }
    }

    pub fn stop(&mut self, uri: &EpisodeUri) {
        match self.session.as_ref().map(|loaded| loaded == uri) {
            None => {
                // Was playing when the last process went away
                self.emit(EpisodeUpdate::playback_status(
                    uri,
                    PlaybackStatus::NotPlaying,
                ));
            }
            Some(true) => {
                self.emit(EpisodeUpdate::playback_progress(uri, 0));
                self.backend.halt();
                self.emit(EpisodeUpdate::playback_status(
                    uri,
                    PlaybackStatus::NotPlaying,
                ));
                self.session = None;
            }
            Some(false) => {}
        }
    }

    /// Report the playhead of the loaded episode
    ///
    /// Driven by client polls. Every `checkpoint_every`-th report, starting
    /// with the first, is persisted.
    pub fn update_playback(&mut self) {
        let Some(uri) = &self.session else {
            return;
        };

        let persistence = if self.ticks % self.checkpoint_every == 0 {
            Persistence::Persist
        } else {
            Persistence::Transient
        };
        self.ticks = self.ticks.wrapping_add(1);

        self.sink.enqueue(
            EpisodeUpdate::playback_progress(uri, self.backend.position_ms()),
            persistence,
        );
    }

    pub fn is_playing(&self) -> bool {
        self.session.is_some() && self.backend.is_playing()
    }

    pub fn is_loaded(&self, uri: &EpisodeUri) -> bool {
        self.session.as_ref() == Some(uri)
    }

    /// Halt the loaded episode and mark it NOT_PLAYING
    pub fn release(&mut self) {
        if let Some(uri) = self.session.take() {
            self.backend.halt();
            self.emit(EpisodeUpdate::playback_status(
                &uri,
                PlaybackStatus::NotPlaying,
            ));
        }
    }

    fn unload_current(&mut self) {
        if let Some(uri) = self.session.take() {
            self.emit(EpisodeUpdate::playback_progress(
                &uri,
                self.backend.position_ms(),
            ));
            self.emit(EpisodeUpdate::playback_status(
                &uri,
                PlaybackStatus::NotPlaying,
            ));
            self.backend.halt();
        }
    }

    fn emit(&self, update: EpisodeUpdate) {
        self.sink.enqueue(update, Persistence::Persist);
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.release();
    }
}
