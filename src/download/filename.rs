// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use url::Url;

/// Used when the URI has no usable last segment
const FALLBACK_FILENAME: &str = "episode";

/// Derive the on-disk filename for an episode from its media URI
///
/// The name is the last non-empty path segment (query and fragment are
/// ignored), sanitized so it can never escape the data directory. The same
/// URI always maps to the same name.
pub fn download_filename(episode_uri: &str) -> String {
    let segment = match Url::parse(episode_uri) {
        Ok(url) => url
            .path_segments()
            .and_then(|segments| segments.filter(|s| !s.is_empty()).next_back())
            .map(String::from),
        Err(_) => episode_uri
            .rsplit('/')
            .find(|s| !s.is_empty())
            .map(String::from),
    };

    let sanitized = segment
        .map(sanitize_filename::sanitize)
        .unwrap_or_default();

    if sanitized.is_empty() || sanitized.chars().all(|c| c == '.') {
        FALLBACK_FILENAME.to_string()
    } else {
        sanitized
    }
}
