// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod description;
mod fetch;
mod parse;

pub use description::{PREVIEW_LENGTH, ParsedDescription, parse_description};
pub use fetch::{fetch_feed, fetch_feed_bytes, is_url, read_feed_file};
pub use parse::parse_feed;
