//! Pending request queue used for compression.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use flowsync_core::DeviceKey;
use tracing::trace;

use crate::types::SyncRequest;

/// Latest not-yet-started request per device.
///
/// An entry means a sync for the device is outstanding. The owner of that
/// sync takes the entry once it holds the device guard.
#[derive(Debug, Default)]
pub struct PendingRequestQueue {
    entries: DashMap<DeviceKey, SyncRequest>,
}

impl PendingRequestQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `request`, merging it into an existing entry.
    ///
    /// Returns `true` when there was no entry, meaning the caller owns the
    /// push and must drive it; `false` when the request was folded into a
    /// sync that someone else will run.
    pub fn offer(&self, key: &DeviceKey, request: SyncRequest) -> bool {
        match self.entries.entry(key.clone()) {
            Entry::Occupied(mut pending) => {
                let merged = pending.get().merged_with(request);
                pending.insert(merged);
                trace!(device = %key, "request merged into pending entry");
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(request);
                true
            }
        }
    }

    /// Remove and return the entry for `key`.
    pub fn take(&self, key: &DeviceKey) -> Option<SyncRequest> {
        self.entries.remove(key).map(|(_, request)| request)
    }

    /// Drop the entry for `key`, if any.
    pub fn remove(&self, key: &DeviceKey) -> bool {
        self.entries.remove(key).is_some()
    }

    #[must_use]
    pub fn contains(&self, key: &DeviceKey) -> bool {
        self.entries.contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
