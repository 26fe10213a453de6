// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The service facade: every remote operation, composed from the feed
//! fetcher, the database, the update queue, downloads and playback.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{DataDir, FEED_LIST_FILENAME, ServiceOptions};
use crate::database::{Database, SharedDatabase};
use crate::download::{DownloadManager, download_filename};
use crate::error::ServiceError;
use crate::feed::fetch_feed;
use crate::http::HttpClient;
use crate::model::{DatabaseState, DownloadStatus, EpisodeUpdate, EpisodeUri, PlaybackStatus};
use crate::playback::{AudioBackend, PlaybackController};
use crate::updates::{Persistence, UpdateQueue};

/// Where the feed list lives and what it currently says
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigInfo {
    pub config_path: PathBuf,
    pub feeds: Vec<String>,
}

/// The podcast library service
///
/// Locks are per purpose: the download registry, the update queue and the
/// database each have their own, and playback calls are serialized by the
/// playback lock. The playback lock is the only one ever held while another
/// is taken.
pub struct Podcaster<C> {
    data_dir: DataDir,
    options: ServiceOptions,
    client: Arc<C>,
    database: SharedDatabase,
    updates: Arc<UpdateQueue>,
    downloads: DownloadManager<C>,
    playback: Mutex<PlaybackController>,
    shutdown: CancellationToken,
}

impl<C: HttpClient + 'static> Podcaster<C> {
    /// Load the library from `data_dir` and wire up the components
    ///
    /// `shutdown` is cancelled when a client asks the service to exit.
    pub fn open(
        data_dir: DataDir,
        client: C,
        backend: Box<dyn AudioBackend>,
        options: ServiceOptions,
        shutdown: CancellationToken,
    ) -> Result<Self, ServiceError> {
        let database = SharedDatabase::new(Database::load(data_dir.snapshot_path())?);
        let updates = Arc::new(UpdateQueue::new(database.clone()));
        let client = Arc::new(client);

        let downloads =
            DownloadManager::new(Arc::clone(&client), data_dir.clone(), updates.clone());
        let playback = PlaybackController::new(
            backend,
            updates.clone(),
            database.clone(),
            data_dir.clone(),
            options.checkpoint_every,
        );

        info!(
            "Opened library at {} ({} podcasts)",
            data_dir.root().display(),
            database.snapshot().podcasts.len()
        );

        Ok(Self {
            data_dir,
            options,
            client,
            database,
            updates,
            downloads,
            playback: Mutex::new(playback),
            shutdown,
        })
    }

    pub fn state(&self) -> DatabaseState {
        self.database.snapshot()
    }

    /// Re-read the feed list, merge every feed and download new episodes
    ///
    /// Feeds are fetched concurrently and merged in list order. A feed that
    /// cannot be fetched or parsed is skipped for this cycle.
    pub async fn refresh(&self) -> DatabaseState {
        let feeds = match self.data_dir.load_feeds() {
            Ok(feeds) => feeds,
            Err(e) => {
                error!("Cannot read feed list: {}", e);
                Vec::new()
            }
        };
        info!("Refreshing {} feeds", feeds.len());

        let max_episodes = self.options.max_episodes_per_podcast;
        let results = join_all(
            feeds
                .iter()
                .map(|feed| fetch_feed(&*self.client, feed, max_episodes)),
        )
        .await;

        let mut new_episodes = Vec::new();
        for (feed, result) in feeds.iter().zip(results) {
            match result {
                Ok(podcast) => new_episodes.extend(self.database.lock().save_podcast(podcast)),
                Err(e) => error!("Skipping feed {}: {}", feed, e),
            }
        }

        self.database.persist();
        let state = self.database.snapshot();

        if !new_episodes.is_empty() {
            info!("Found {} new episodes", new_episodes.len());
        }
        for uri in new_episodes {
            self.downloads.start_download(uri);
        }

        state
    }

    /// Drain queued updates, sampling the playhead first
    pub fn episode_updates(&self) -> Vec<EpisodeUpdate> {
        self.lock_playback().update_playback();
        self.updates.drain()
    }

    pub fn play(&self, uri: &EpisodeUri) {
        self.lock_playback().play(uri);
    }

    pub fn pause(&self, uri: &EpisodeUri) {
        self.lock_playback().pause(uri);
    }

    pub fn resume(&self, uri: &EpisodeUri) {
        self.lock_playback().resume(uri);
    }

    pub fn stop(&self, uri: &EpisodeUri) {
        self.lock_playback().stop(uri);
    }

    /// Remove the downloaded media of a finished or failed download
    pub async fn delete(&self, uri: &EpisodeUri) {
        let Some(episode) = self.database.find_episode(uri) else {
            return;
        };
        if !matches!(
            episode.download_status,
            DownloadStatus::Success | DownloadStatus::Error
        ) {
            return;
        }

        {
            let mut playback = self.lock_playback();
            if playback.is_loaded(uri) {
                playback.stop(uri);
            }
        }

        info!("Deleting {}", uri.episode_uri);
        self.downloads.delete(uri, Persistence::Persist).await;
    }

    pub fn download(&self, uri: EpisodeUri) {
        self.downloads.start_download(uri);
    }

    pub fn cancel_download(&self, uri: &EpisodeUri) {
        self.downloads.cancel_download(uri);
    }

    /// Delete every finished or failed download that is not playing, then
    /// remove media files no episode accounts for
    pub async fn cleanup_downloads(&self) {
        info!("Cleaning up downloads");
        let state = self.database.snapshot();

        for podcast in &state.podcasts {
            for episode in &podcast.episodes {
                let finished = matches!(
                    episode.download_status,
                    DownloadStatus::Success | DownloadStatus::Error
                );
                if finished && episode.playback_status != PlaybackStatus::Playing {
                    let uri = EpisodeUri::new(&podcast.podcast_uri, &episode.episode_uri);
                    self.downloads.delete(&uri, Persistence::Transient).await;
                }
            }
        }
        self.database.persist();

        self.remove_orphans().await;
    }

    async fn remove_orphans(&self) {
        let tracked: HashSet<String> = self
            .database
            .snapshot()
            .podcasts
            .iter()
            .flat_map(|podcast| &podcast.episodes)
            .filter(|episode| episode.download_status != DownloadStatus::NotDownloaded)
            .map(|episode| download_filename(&episode.episode_uri))
            .collect();

        let mut entries = match tokio::fs::read_dir(self.data_dir.root()).await {
            Ok(entries) => entries,
            Err(e) => {
                error!("Cannot list {}: {}", self.data_dir.root().display(), e);
                return;
            }
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let Ok(filename) = entry.file_name().into_string() else {
                continue;
            };
            let is_file = entry.file_type().await.is_ok_and(|t| t.is_file());
            if !is_file || self.data_dir.is_reserved(&filename) || tracked.contains(&filename) {
                continue;
            }

            warn!("Found orphaned file {}, deleting", filename);
            if let Err(e) = tokio::fs::remove_file(entry.path()).await {
                error!("Failed to remove {}: {}", entry.path().display(), e);
            }
        }
    }

    /// Stop everything and wipe the data directory except the feed list
    pub async fn cleanup_all(&self) -> Result<(), ServiceError> {
        info!("Wiping library");
        self.lock_playback().release();
        self.downloads.cancel_all().await;
        self.updates.clear();
        self.database.reset();

        let root = self.data_dir.root();
        let mut entries = tokio::fs::read_dir(root)
            .await
            .map_err(|e| ServiceError::CleanupFailed {
                path: root.to_path_buf(),
                source: e,
            })?;

        while let Some(entry) =
            entries
                .next_entry()
                .await
                .map_err(|e| ServiceError::CleanupFailed {
                    path: root.to_path_buf(),
                    source: e,
                })?
        {
            if entry.file_name() == FEED_LIST_FILENAME {
                continue;
            }

            let path = entry.path();
            let is_dir = entry.file_type().await.is_ok_and(|t| t.is_dir());
            let removed = if is_dir {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            removed.map_err(|e| ServiceError::CleanupFailed { path, source: e })?;
        }

        Ok(())
    }

    pub fn config_info(&self) -> Result<ConfigInfo, ServiceError> {
        let feeds = self.data_dir.load_feeds()?;
        Ok(ConfigInfo {
            config_path: self.data_dir.feed_list_path(),
            feeds,
        })
    }

    /// Ask the process to exit unless something is audibly playing
    pub fn shutdown_if_not_playing(&self) {
        if self.is_playing() {
            info!("Shutdown declined, playback in progress");
        } else {
            info!("Shutdown requested");
            self.shutdown.cancel();
        }
    }

    pub fn is_playing(&self) -> bool {
        self.lock_playback().is_playing()
    }

    /// Halt playback, cancel and await every download, write the snapshot
    pub async fn shutdown(&self) {
        self.lock_playback().release();
        self.downloads.cancel_all().await;
        self.database.persist();
        info!("Library saved");
    }

    fn lock_playback(&self) -> MutexGuard<'_, PlaybackController> {
        self.playback.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{ByteStream, HttpResponse};
    use crate::playback::{HeadlessBackend, silent_wav};
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::collections::HashMap;
    use tempfile::{TempDir, tempdir};

    const FEED_URL: &str = "https://example.com/feed.xml";
    const EP1: &str = "https://example.com/media/ep1.wav";
    const EP2: &str = "https://example.com/media/ep2.wav";

    fn feed_xml(episodes: &[(&str, &str)]) -> Vec<u8> {
        let items: String = episodes
            .iter()
            .map(|(title, url)| {
                format!(
                    r#"<item><title>{title}</title><enclosure url="{url}" type="audio/wav"/></item>"#
                )
            })
            .collect();
        format!(
            r#"<?xml version="1.0"?><rss version="2.0"><channel><title>Show</title>{items}</channel></rss>"#
        )
        .into_bytes()
    }

    /// Serves a fixed map of URLs; anything else is a 404
    struct MockHttpClient {
        documents: HashMap<String, Vec<u8>>,
    }

    #[async_trait]
    impl HttpClient for MockHttpClient {
        async fn get_bytes(&self, url: &str) -> Result<Bytes, reqwest::Error> {
            Ok(Bytes::from(
                self.documents.get(url).cloned().unwrap_or_default(),
            ))
        }

        async fn get_stream(&self, url: &str) -> Result<HttpResponse, reqwest::Error> {
            let (status, data) = match self.documents.get(url) {
                Some(data) => (200, data.clone()),
                None => (404, Vec::new()),
            };
            let len = data.len() as u64;
            let body: ByteStream = Box::pin(futures::stream::once(async move {
                Ok::<_, reqwest::Error>(Bytes::from(data))
            }));

            Ok(HttpResponse {
                status,
                content_length: Some(len),
                body,
            })
        }
    }

    struct Fixture {
        service: Podcaster<MockHttpClient>,
        shutdown: CancellationToken,
        dir: TempDir,
    }

    fn fixture(feeds: &str, documents: Vec<(&str, Vec<u8>)>) -> Fixture {
        let dir = tempdir().unwrap();
        let data_dir = DataDir::open(dir.path()).unwrap();
        std::fs::write(data_dir.feed_list_path(), feeds).unwrap();

        let client = MockHttpClient {
            documents: documents
                .into_iter()
                .map(|(url, data)| (url.to_string(), data))
                .collect(),
        };
        let shutdown = CancellationToken::new();
        let service = Podcaster::open(
            data_dir,
            client,
            Box::new(HeadlessBackend::new()),
            ServiceOptions::default(),
            shutdown.clone(),
        )
        .unwrap();

        Fixture {
            service,
            shutdown,
            dir,
        }
    }

    fn two_episode_fixture() -> Fixture {
        fixture(
            FEED_URL,
            vec![
                (FEED_URL, feed_xml(&[("Second", EP2), ("First", EP1)])),
                (EP1, silent_wav(2_000)),
                (EP2, silent_wav(3_000)),
            ],
        )
    }

    async fn settle_downloads(service: &Podcaster<MockHttpClient>) {
        for episode in [EP1, EP2] {
            while service.downloads.is_active(&EpisodeUri::new(FEED_URL, episode)) {
                tokio::task::yield_now().await;
            }
        }
    }

    fn status(service: &Podcaster<MockHttpClient>, episode: &str) -> DownloadStatus {
        service
            .database
            .find_episode(&EpisodeUri::new(FEED_URL, episode))
            .unwrap()
            .download_status
    }

    #[tokio::test]
    async fn first_refresh_downloads_only_the_latest_episode() {
        let f = two_episode_fixture();

        let state = f.service.refresh().await;
        settle_downloads(&f.service).await;

        assert_eq!(state.podcasts.len(), 1);
        assert_eq!(state.podcasts[0].title, "Show");
        assert_eq!(state.podcasts[0].episodes.len(), 2);
        assert_eq!(status(&f.service, EP2), DownloadStatus::Success);
        assert_eq!(status(&f.service, EP1), DownloadStatus::NotDownloaded);
        assert!(f.dir.path().join("ep2.wav").exists());
        assert!(!f.dir.path().join("ep1.wav").exists());
    }

    #[tokio::test]
    async fn unchanged_refresh_starts_no_downloads() {
        let f = two_episode_fixture();
        f.service.refresh().await;
        settle_downloads(&f.service).await;
        std::fs::remove_file(f.dir.path().join("ep2.wav")).unwrap();

        f.service.refresh().await;
        settle_downloads(&f.service).await;

        assert!(!f.dir.path().join("ep2.wav").exists());
    }

    #[tokio::test]
    async fn refresh_skips_unreadable_feeds() {
        let f = fixture(
            &format!("/nonexistent/feed.xml\n{FEED_URL}\n"),
            vec![(FEED_URL, feed_xml(&[("Only", EP1)]))],
        );

        let state = f.service.refresh().await;
        settle_downloads(&f.service).await;

        assert_eq!(state.podcasts.len(), 1);
        assert_eq!(state.podcasts[0].podcast_uri, FEED_URL);
    }

    #[tokio::test]
    async fn refresh_persists_the_library() {
        let f = two_episode_fixture();

        f.service.refresh().await;
        settle_downloads(&f.service).await;

        let reloaded = Database::load(f.dir.path().join("library.bin")).unwrap();
        assert_eq!(reloaded.state().podcasts.len(), 1);
    }

    #[tokio::test]
    async fn episode_updates_drain_download_progress() {
        let f = two_episode_fixture();
        f.service.refresh().await;
        settle_downloads(&f.service).await;

        let updates = f.service.episode_updates();

        let ep2 = EpisodeUri::new(FEED_URL, EP2);
        assert!(updates.contains(&EpisodeUpdate::download_status(&ep2, DownloadStatus::Success)));
        assert!(f.service.episode_updates().is_empty());
    }

    #[tokio::test]
    async fn play_and_poll_report_position() {
        let f = two_episode_fixture();
        f.service.refresh().await;
        settle_downloads(&f.service).await;
        f.service.episode_updates();
        let ep2 = EpisodeUri::new(FEED_URL, EP2);

        f.service.play(&ep2);
        assert!(f.service.is_playing());
        let updates = f.service.episode_updates();

        assert!(updates.contains(&EpisodeUpdate::playback_status(&ep2, PlaybackStatus::Playing)));
        assert!(updates.contains(&EpisodeUpdate::playback_duration(&ep2, 3_000)));
        assert!(updates
            .iter()
            .any(|u| u.uri == ep2 && matches!(u.change, crate::model::EpisodeChange::NewPlaybackProgress(_))));
    }

    #[tokio::test]
    async fn delete_requires_a_finished_download() {
        let f = two_episode_fixture();
        f.service.refresh().await;
        settle_downloads(&f.service).await;
        let ep1 = EpisodeUri::new(FEED_URL, EP1);
        let ep2 = EpisodeUri::new(FEED_URL, EP2);
        std::fs::write(f.dir.path().join("ep1.wav"), b"stray").unwrap();

        f.service.delete(&ep1).await;
        assert!(f.dir.path().join("ep1.wav").exists());

        f.service.play(&ep2);
        f.service.delete(&ep2).await;

        assert!(!f.dir.path().join("ep2.wav").exists());
        let episode = f.service.database.find_episode(&ep2).unwrap();
        assert_eq!(episode.download_status, DownloadStatus::NotDownloaded);
        assert_eq!(episode.playback_status, PlaybackStatus::NotPlaying);
        assert_eq!(episode.playback_progress.total_ms, 0);
        assert!(!f.service.is_playing());
    }

    #[tokio::test]
    async fn cleanup_downloads_spares_the_playing_episode() {
        let f = two_episode_fixture();
        f.service.refresh().await;
        settle_downloads(&f.service).await;
        let ep1 = EpisodeUri::new(FEED_URL, EP1);
        let ep2 = EpisodeUri::new(FEED_URL, EP2);
        f.service.download(ep1.clone());
        settle_downloads(&f.service).await;
        std::fs::write(f.dir.path().join("orphan.mp3"), b"junk").unwrap();

        f.service.play(&ep2);
        f.service.cleanup_downloads().await;

        assert_eq!(status(&f.service, EP1), DownloadStatus::NotDownloaded);
        assert_eq!(status(&f.service, EP2), DownloadStatus::Success);
        assert!(!f.dir.path().join("ep1.wav").exists());
        assert!(f.dir.path().join("ep2.wav").exists());
        assert!(!f.dir.path().join("orphan.mp3").exists());
        assert!(f.dir.path().join("feeds.txt").exists());
        assert!(f.dir.path().join("library.bin").exists());
    }

    #[tokio::test]
    async fn cleanup_all_keeps_only_the_feed_list() {
        let f = two_episode_fixture();
        f.service.refresh().await;
        settle_downloads(&f.service).await;
        f.service.play(&EpisodeUri::new(FEED_URL, EP2));

        f.service.cleanup_all().await.unwrap();

        assert!(!f.service.is_playing());
        assert!(f.service.state().podcasts.is_empty());
        assert!(f.service.episode_updates().is_empty());
        let remaining: Vec<_> = std::fs::read_dir(f.dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(remaining, vec![std::ffi::OsString::from("feeds.txt")]);
    }

    #[tokio::test]
    async fn config_info_lists_feeds() {
        let f = fixture("# comment\nhttps://a.example/feed.xml\n", Vec::new());

        let info = f.service.config_info().unwrap();

        assert_eq!(info.config_path, f.dir.path().join("feeds.txt"));
        assert_eq!(info.feeds, vec!["https://a.example/feed.xml"]);
    }

    #[tokio::test]
    async fn shutdown_is_declined_while_playing() {
        let f = two_episode_fixture();
        f.service.refresh().await;
        settle_downloads(&f.service).await;
        let ep2 = EpisodeUri::new(FEED_URL, EP2);

        f.service.play(&ep2);
        f.service.shutdown_if_not_playing();
        assert!(!f.shutdown.is_cancelled());

        f.service.pause(&ep2);
        f.service.shutdown_if_not_playing();
        assert!(f.shutdown.is_cancelled());
    }

    #[tokio::test]
    async fn shutdown_releases_playback_and_persists() {
        let f = two_episode_fixture();
        f.service.refresh().await;
        settle_downloads(&f.service).await;
        let ep2 = EpisodeUri::new(FEED_URL, EP2);
        f.service.play(&ep2);

        f.service.shutdown().await;

        let reloaded = Database::load(f.dir.path().join("library.bin")).unwrap();
        assert_eq!(
            reloaded.find_episode(&ep2).unwrap().playback_status,
            PlaybackStatus::NotPlaying
        );
    }
}
