// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::DataDir;
use crate::error::DownloadError;
use crate::http::HttpClient;
use crate::model::{DownloadStatus, EpisodeUpdate, EpisodeUri};
use crate::updates::{Persistence, SharedUpdateSink};

use super::transfer::{TransferOutcome, transfer};

type DownloadResult = Result<TransferOutcome, DownloadError>;

/// A download task that has been started and not yet reaped
struct ActiveDownload {
    uri: EpisodeUri,
    cancel: CancellationToken,
    handle: JoinHandle<DownloadResult>,
}

impl ActiveDownload {
    fn is_live(&self) -> bool {
        !self.handle.is_finished()
    }
}

/// Runs one task per in-flight episode download
///
/// All state changes are reported through the update sink; callers never
/// learn about failures from return values.
pub struct DownloadManager<C> {
    client: Arc<C>,
    data_dir: DataDir,
    sink: SharedUpdateSink,
    active: Mutex<Vec<ActiveDownload>>,
}

impl<C: HttpClient + 'static> DownloadManager<C> {
    pub fn new(client: Arc<C>, data_dir: DataDir, sink: SharedUpdateSink) -> Self {
        Self {
            client,
            data_dir,
            sink,
            active: Mutex::new(Vec::new()),
        }
    }

    /// Start downloading `uri` in the background
    ///
    /// Finished tasks are reaped first. A request for an episode that
    /// already has a live task is ignored.
    pub fn start_download(&self, uri: EpisodeUri) {
        let mut active = self.lock_active();
        reap(&mut active);

        if active.iter().any(|download| download.uri == uri) {
            warn!("Download of {} already in progress, ignoring", uri.episode_uri);
            return;
        }

        info!("Starting download of {}", uri.episode_uri);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_download(
            Arc::clone(&self.client),
            self.data_dir.media_path(&uri.episode_uri),
            uri.clone(),
            cancel.clone(),
            Arc::clone(&self.sink),
        ));

        active.push(ActiveDownload {
            uri,
            cancel,
            handle,
        });
    }

    /// Ask the live task for `uri` to stop
    ///
    /// Without a live task (the service restarted mid-download, or the
    /// transfer already ended) the episode is corrected to NOT_DOWNLOADED
    /// directly.
    pub fn cancel_download(&self, uri: &EpisodeUri) {
        let signalled = {
            let active = self.lock_active();
            match active.iter().find(|d| &d.uri == uri && d.is_live()) {
                Some(download) => {
                    download.cancel.cancel();
                    true
                }
                None => false,
            }
        };

        if signalled {
            info!("Cancelling download of {}", uri.episode_uri);
        } else {
            info!("No live download for {}, resetting status", uri.episode_uri);
            self.sink.enqueue(
                EpisodeUpdate::download_status(uri, DownloadStatus::NotDownloaded),
                Persistence::Persist,
            );
        }
    }

    /// Cancel every outstanding download and wait for the tasks to exit
    pub async fn cancel_all(&self) {
        let downloads = std::mem::take(&mut *self.lock_active());

        for download in &downloads {
            download.cancel.cancel();
        }
        for download in downloads {
            log_result(&download.uri, download.handle.await);
        }
    }

    /// Remove the media file of `uri` and reset its download and playback fields
    ///
    /// Every update but the last is transient; the last one uses `persistence`.
    pub async fn delete(&self, uri: &EpisodeUri, persistence: Persistence) {
        remove_media(&self.data_dir.media_path(&uri.episode_uri)).await;

        self.sink.enqueue(
            EpisodeUpdate::download_progress(uri, 0, 0),
            Persistence::Transient,
        );
        self.sink.enqueue(
            EpisodeUpdate::download_status(uri, DownloadStatus::NotDownloaded),
            Persistence::Transient,
        );
        self.sink.enqueue(
            EpisodeUpdate::playback_progress(uri, 0),
            Persistence::Transient,
        );
        self.sink
            .enqueue(EpisodeUpdate::playback_duration(uri, 0), persistence);
    }

    pub fn is_active(&self, uri: &EpisodeUri) -> bool {
        self.lock_active()
            .iter()
            .any(|download| &download.uri == uri && download.is_live())
    }

    fn lock_active(&self) -> MutexGuard<'_, Vec<ActiveDownload>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Drop finished tasks, surfacing their errors
fn reap(active: &mut Vec<ActiveDownload>) {
    active.retain_mut(|download| {
        if download.is_live() {
            return true;
        }
        if let Some(result) = (&mut download.handle).now_or_never() {
            log_result(&download.uri, result);
        }
        false
    });
}

fn log_result(uri: &EpisodeUri, result: Result<DownloadResult, tokio::task::JoinError>) {
    match result {
        Ok(Ok(TransferOutcome::Completed(bytes))) => {
            debug!("Reaped download of {} ({} bytes)", uri.episode_uri, bytes)
        }
        Ok(Ok(TransferOutcome::Cancelled)) => {
            debug!("Reaped cancelled download of {}", uri.episode_uri)
        }
        Ok(Err(e)) => error!("Download of {} failed: {}", uri.episode_uri, e),
        Err(e) => error!("Download task for {} aborted: {}", uri.episode_uri, e),
    }
}

async fn run_download<C: HttpClient + ?Sized>(
    client: Arc<C>,
    path: PathBuf,
    uri: EpisodeUri,
    cancel: CancellationToken,
    sink: SharedUpdateSink,
) -> DownloadResult {
    sink.enqueue(
        EpisodeUpdate::download_status(&uri, DownloadStatus::InProgress),
        Persistence::Persist,
    );

    let result = transfer(&*client, &uri.episode_uri, &path, &cancel, |done, total| {
        sink.enqueue(
            EpisodeUpdate::download_progress(&uri, done, total),
            Persistence::Transient,
        );
    })
    .await;

    match &result {
        Ok(TransferOutcome::Completed(_)) => {
            info!("Downloaded {}", uri.episode_uri);
            sink.enqueue(
                EpisodeUpdate::download_status(&uri, DownloadStatus::Success),
                Persistence::Persist,
            );
        }
        Ok(TransferOutcome::Cancelled) => {
            info!("Download of {} cancelled", uri.episode_uri);
            remove_media(&path).await;
            sink.enqueue(
                EpisodeUpdate::download_progress(&uri, 0, 0),
                Persistence::Transient,
            );
            sink.enqueue(
                EpisodeUpdate::download_status(&uri, DownloadStatus::NotDownloaded),
                Persistence::Persist,
            );
        }
        Err(_) => {
            sink.enqueue(
                EpisodeUpdate::download_status(&uri, DownloadStatus::Error),
                Persistence::Persist,
            );
        }
    }

    result
}

async fn remove_media(path: &std::path::Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", path.display(), e),
    }
}
