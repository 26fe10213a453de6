// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use futures::StreamExt;
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use crate::error::DownloadError;
use crate::http::HttpClient;

/// How a transfer ended when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferOutcome {
    /// The whole body was written; carries the byte count
    Completed(u64),
    /// The token fired before the body was fully written
    Cancelled,
}

/// Stream `url` into `output_path`
///
/// `on_progress` receives `(downloaded, total)` after every chunk, but only
/// when the server announced a nonzero content length. Cancellation is
/// observed between chunks.
pub async fn transfer<C, F>(
    client: &C,
    url: &str,
    output_path: &Path,
    cancel: &CancellationToken,
    mut on_progress: F,
) -> Result<TransferOutcome, DownloadError>
where
    C: HttpClient + ?Sized,
    F: FnMut(u64, u64),
{
    let mut file = File::create(output_path)
        .await
        .map_err(|e| DownloadError::FileCreateFailed {
            path: output_path.to_path_buf(),
            source: e,
        })?;

    let response = tokio::select! {
        biased;
        _ = cancel.cancelled() => return Ok(TransferOutcome::Cancelled),
        response = client.get_stream(url) => response.map_err(|e| DownloadError::HttpFailed {
            url: url.to_string(),
            source: e,
        })?,
    };

    if response.status >= 400 {
        return Err(DownloadError::HttpStatus {
            url: url.to_string(),
            status: response.status,
        });
    }

    let total = response.content_length.unwrap_or(0);
    let mut downloaded: u64 = 0;
    let mut stream = response.body;

    loop {
        let chunk = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(TransferOutcome::Cancelled),
            next = stream.next() => match next {
                Some(chunk) => chunk.map_err(|e| DownloadError::StreamFailed {
                    url: url.to_string(),
                    source: e,
                })?,
                None => break,
            },
        };

        file.write_all(&chunk)
            .await
            .map_err(|e| DownloadError::FileWriteFailed {
                path: output_path.to_path_buf(),
                source: e,
            })?;

        downloaded += chunk.len() as u64;
        if total > 0 {
            on_progress(downloaded, total);
        }
    }

    file.flush()
        .await
        .map_err(|e| DownloadError::FileWriteFailed {
            path: output_path.to_path_buf(),
            source: e,
        })?;

    Ok(TransferOutcome::Completed(downloaded))
}
