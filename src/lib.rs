// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

pub mod config;
pub mod database;
pub mod download;
pub mod error;
pub mod feed;
pub mod http;
pub mod model;
pub mod playback;
pub mod server;
pub mod service;
pub mod updates;

// Re-export main types for convenience
pub use config::{DataDir, ServiceOptions};
pub use database::{Database, SharedDatabase};
pub use download::{DownloadManager, download_filename};
pub use error::{ConfigError, DatabaseError, DownloadError, FeedError, PlaybackError, ServiceError};
pub use feed::{fetch_feed, parse_description, parse_feed};
pub use http::{HttpClient, HttpResponse, ReqwestClient};
pub use model::{
    DatabaseState, DownloadProgress, DownloadStatus, Episode, EpisodeChange, EpisodeUpdate,
    EpisodeUri, PlaybackProgress, PlaybackStatus, Podcast,
};
pub use playback::{AudioBackend, HeadlessBackend, PlaybackController};
pub use server::{router, serve};
pub use service::{ConfigInfo, Podcaster};
pub use updates::{Persistence, SharedUpdateSink, UpdateQueue, UpdateSink};
