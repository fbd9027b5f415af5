//! Devices waiting for a fresh snapshot before a failed sync is retried.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use flowsync_core::DeviceKey;

use crate::types::ObservedSnapshot;

/// Failed devices and the time their retry was registered.
#[derive(Debug, Default)]
pub struct RetryRegistry {
    registered: DashMap<DeviceKey, DateTime<Utc>>,
}

impl RetryRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `key` now. A repeated registration moves the timestamp
    /// forward, so only snapshots gathered after the latest failure count.
    pub fn register(&self, key: &DeviceKey) -> DateTime<Utc> {
        self.register_at(key, Utc::now())
    }

    pub fn register_at(&self, key: &DeviceKey, at: DateTime<Utc>) -> DateTime<Utc> {
        self.registered.insert(key.clone(), at);
        at
    }

    /// Returns `true` if the device was registered.
    pub fn unregister_if_registered(&self, key: &DeviceKey) -> bool {
        self.registered.remove(key).is_some()
    }

    #[must_use]
    pub fn is_registered(&self, key: &DeviceKey) -> bool {
        self.registered.contains_key(key)
    }

    #[must_use]
    pub fn registered_at(&self, key: &DeviceKey) -> Option<DateTime<Utc>> {
        self.registered.get(key).map(|entry| *entry.value())
    }

    /// A snapshot justifies a retry when it was gathered no earlier than the
    /// failure that registered the device.
    #[must_use]
    pub fn is_consistent(&self, key: &DeviceKey, snapshot: &ObservedSnapshot) -> bool {
        match (self.registered_at(key), snapshot.gathered_at) {
            (Some(registered), Some(gathered)) => gathered >= registered,
            _ => false,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.registered.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registered.is_empty()
    }
}
