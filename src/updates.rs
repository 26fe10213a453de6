// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::sync::{Arc, Mutex, PoisonError};

use crate::database::SharedDatabase;
use crate::model::EpisodeUpdate;

/// Whether an update forces a snapshot write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Persistence {
    /// Only the in-memory view and the outbound queue change
    Transient,
    /// The snapshot is written before `enqueue` returns
    Persist,
}

/// Receives state changes produced by downloads and playback.
///
/// Sub-controllers hold one of these instead of a handle to the service.
pub trait UpdateSink: Send + Sync {
    fn enqueue(&self, update: EpisodeUpdate, persistence: Persistence);
}

/// A shared reference to an update sink
pub type SharedUpdateSink = Arc<dyn UpdateSink>;

/// Outbound updates waiting for the next client poll.
///
/// The queue lock and the database lock are taken one after the other,
/// never nested.
pub struct UpdateQueue {
    pending: Mutex<Vec<EpisodeUpdate>>,
    database: SharedDatabase,
}

impl UpdateQueue {
    pub fn new(database: SharedDatabase) -> Self {
        Self {
            pending: Mutex::new(Vec::new()),
            database,
        }
    }

    /// Take every queued update; each one is delivered at most once
    pub fn drain(&self) -> Vec<EpisodeUpdate> {
        std::mem::take(&mut *self.pending.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Drop queued updates without delivering them
    pub fn clear(&self) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl UpdateSink for UpdateQueue {
    fn enqueue(&self, update: EpisodeUpdate, persistence: Persistence) {
        {
            let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            pending.retain(|queued| !queued.is_superseded_by(&update));
            pending.push(update.clone());
        }
        self.database.apply(&update, persistence);
    }
}
