// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;

use bytes::Bytes;
use tracing::debug;

use crate::error::FeedError;
use crate::http::HttpClient;
use crate::model::Podcast;

use super::parse::parse_feed;

/// Fetch raw feed bytes from a URL (without parsing)
pub async fn fetch_feed_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Bytes, FeedError> {
    client
        .get_bytes(url)
        .await
        .map_err(|e| FeedError::FetchFailed {
            url: url.to_string(),
            source: e,
        })
}

/// Read raw feed bytes from a local file (without parsing)
pub fn read_feed_file(path: &Path) -> Result<Vec<u8>, FeedError> {
    std::fs::read(path).map_err(|e| FeedError::FileReadFailed {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Fetch and parse the feed behind `source`, which is a URL or a local path
///
/// The source string becomes the podcast URI.
pub async fn fetch_feed<C: HttpClient>(
    client: &C,
    source: &str,
    max_episodes: usize,
) -> Result<Podcast, FeedError> {
    let bytes = if is_url(source) {
        debug!("Fetching feed {}", source);
        fetch_feed_bytes(client, source).await?.to_vec()
    } else {
        debug!("Reading feed file {}", source);
        read_feed_file(Path::new(source))?
    };
    parse_feed(&bytes, source, max_episodes)
}

/// Determine if a string is a URL or a file path
pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::http::HttpResponse;
    use async_trait::async_trait;
    use tempfile::tempdir;

    const FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0">
  <channel>
    <title>Fetched</title>
    <item>
      <title>One</title>
      <enclosure url="https://example.com/one.mp3" type="audio/mpeg"/>
    </item>
  </channel>
</rss>"#;

    struct StaticClient;

    #[async_trait]
    impl HttpClient for StaticClient {
        async fn get_bytes(&self, _url: &str) -> Result<Bytes, reqwest::Error> {
            Ok(Bytes::from_static(FEED.as_bytes()))
        }

        async fn get_stream(&self, _url: &str) -> Result<HttpResponse, reqwest::Error> {
            unreachable!("feeds are fetched whole")
        }
    }

    #[test]
    fn is_url_detects_http() {
        assert!(is_url("http://example.com/feed.xml"));
        assert!(is_url("https://example.com/feed.xml"));
    }

    #[test]
    fn is_url_rejects_file_paths() {
        assert!(!is_url("/path/to/feed.xml"));
        assert!(!is_url("./feed.xml"));
        assert!(!is_url("feed.xml"));
    }

    #[tokio::test]
    async fn fetch_feed_over_http_uses_source_as_uri() {
        let podcast = fetch_feed(&StaticClient, "https://example.com/feed.xml", 10)
            .await
            .unwrap();

        assert_eq!(podcast.podcast_uri, "https://example.com/feed.xml");
        assert_eq!(podcast.title, "Fetched");
        assert_eq!(podcast.episodes.len(), 1);
    }

    #[tokio::test]
    async fn fetch_feed_reads_local_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("feed.xml");
        std::fs::write(&path, FEED).unwrap();
        let source = path.to_string_lossy().to_string();

        let podcast = fetch_feed(&StaticClient, &source, 10).await.unwrap();

        assert_eq!(podcast.podcast_uri, source);
        assert_eq!(podcast.episodes[0].episode_uri, "https://example.com/one.mp3");
    }

    #[tokio::test]
    async fn fetch_feed_reports_missing_file() {
        let result = fetch_feed(&StaticClient, "/nonexistent/feed.xml", 10).await;

        assert!(matches!(result, Err(FeedError::FileReadFailed { .. })));
    }
}
