// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! HTTP/JSON binding of the service operations.
//!
//! Episode commands always answer `204 No Content`; clients learn what
//! happened by polling `/state` and `/updates`. Only `/config` reports
//! failures.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::error::ServiceError;
use crate::http::HttpClient;
use crate::model::{DatabaseState, EpisodeUri};
use crate::service::{ConfigInfo, Podcaster};

pub const NDJSON_CONTENT_TYPE: &str = "application/x-ndjson";

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}

type SharedService<C> = State<Arc<Podcaster<C>>>;

pub fn router<C: HttpClient + 'static>(service: Arc<Podcaster<C>>) -> Router {
    Router::new()
        .route("/state", get(state::<C>))
        .route("/refresh", post(refresh::<C>))
        .route("/updates", get(updates::<C>))
        .route("/episodes/play", post(play::<C>))
        .route("/episodes/pause", post(pause::<C>))
        .route("/episodes/resume", post(resume::<C>))
        .route("/episodes/stop", post(stop::<C>))
        .route("/episodes/delete", post(delete::<C>))
        .route("/episodes/download", post(download::<C>))
        .route("/episodes/cancel-download", post(cancel_download::<C>))
        .route("/cleanup/downloads", post(cleanup_downloads::<C>))
        .route("/cleanup/all", post(cleanup_all::<C>))
        .route("/config", get(config::<C>))
        .route("/shutdown-if-not-playing", post(shutdown_if_not_playing::<C>))
        .with_state(service)
}

/// Serve until `shutdown` is cancelled, then let in-flight requests finish
pub async fn serve<C: HttpClient + 'static>(
    listener: TcpListener,
    service: Arc<Podcaster<C>>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    axum::serve(listener, router(service))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn state<C: HttpClient + 'static>(State(service): SharedService<C>) -> Json<DatabaseState> {
    Json(service.state())
}

async fn refresh<C: HttpClient + 'static>(State(service): SharedService<C>) -> Json<DatabaseState> {
    Json(service.refresh().await)
}

async fn updates<C: HttpClient + 'static>(State(service): SharedService<C>) -> Response {
    let lines: Vec<Result<String, Infallible>> = service
        .episode_updates()
        .iter()
        .filter_map(|update| match serde_json::to_string(update) {
            Ok(line) => Some(Ok(line + "\n")),
            Err(e) => {
                error!("Failed to encode update: {}", e);
                None
            }
        })
        .collect();

    (
        [(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)],
        Body::from_stream(futures::stream::iter(lines)),
    )
        .into_response()
}

async fn play<C: HttpClient + 'static>(
    State(service): SharedService<C>,
    Json(uri): Json<EpisodeUri>,
) -> StatusCode {
    service.play(&uri);
    StatusCode::NO_CONTENT
}

async fn pause<C: HttpClient + 'static>(
    State(service): SharedService<C>,
    Json(uri): Json<EpisodeUri>,
) -> StatusCode {
    service.pause(&uri);
    StatusCode::NO_CONTENT
}

async fn resume<C: HttpClient + 'static>(
    State(service): SharedService<C>,
    Json(uri): Json<EpisodeUri>,
) -> StatusCode {
    service.resume(&uri);
    StatusCode::NO_CONTENT
}

async fn stop<C: HttpClient + 'static>(
    State(service): SharedService<C>,
    Json(uri): Json<EpisodeUri>,
) -> StatusCode {
    service.stop(&uri);
    StatusCode::NO_CONTENT
}

async fn delete<C: HttpClient + 'static>(
    State(service): SharedService<C>,
    Json(uri): Json<EpisodeUri>,
) -> StatusCode {
    service.delete(&uri).await;
    StatusCode::NO_CONTENT
}

async fn download<C: HttpClient + 'static>(
    State(service): SharedService<C>,
    Json(uri): Json<EpisodeUri>,
) -> StatusCode {
    service.download(uri);
    StatusCode::NO_CONTENT
}

async fn cancel_download<C: HttpClient + 'static>(
    State(service): SharedService<C>,
    Json(uri): Json<EpisodeUri>,
) -> StatusCode {
    service.cancel_download(&uri);
    StatusCode::NO_CONTENT
}

async fn cleanup_downloads<C: HttpClient + 'static>(State(service): SharedService<C>) -> StatusCode {
    service.cleanup_downloads().await;
    StatusCode::NO_CONTENT
}

async fn cleanup_all<C: HttpClient + 'static>(State(service): SharedService<C>) -> StatusCode {
    if let Err(e) = service.cleanup_all().await {
        error!("Cleanup incomplete: {}", e);
    }
    StatusCode::NO_CONTENT
}

async fn config<C: HttpClient + 'static>(
    State(service): SharedService<C>,
) -> Result<Json<ConfigInfo>, ServiceError> {
    Ok(Json(service.config_info()?))
}

async fn shutdown_if_not_playing<C: HttpClient + 'static>(
    State(service): SharedService<C>,
) -> StatusCode {
    service.shutdown_if_not_playing();
    StatusCode::NO_CONTENT
}
