// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

mod backend;
mod controller;

pub use backend::{AudioBackend, HeadlessBackend, read_duration};
pub use controller::PlaybackController;

#[cfg(test)]
pub(crate) use backend::tests::silent_wav;
