//! Devices whose next sync must be a full reconciliation.

use dashmap::DashSet;
use flowsync_core::DeviceKey;

use crate::types::ObservedSnapshot;

/// Set of devices awaiting a full reconciliation pass.
#[derive(Debug, Default)]
pub struct ReconciliationRegistry {
    devices: DashSet<DeviceKey>,
}

impl ReconciliationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` if the device was not registered yet.
    pub fn register(&self, key: &DeviceKey) -> bool {
        self.devices.insert(key.clone())
    }

    /// Returns `true` if the device was registered.
    pub fn unregister(&self, key: &DeviceKey) -> bool {
        self.devices.remove(key).is_some()
    }

    /// Same as [`Self::unregister`]; reads better at call sites that do not
    /// care whether the device was registered.
    pub fn unregister_if_registered(&self, key: &DeviceKey) -> bool {
        self.unregister(key)
    }

    #[must_use]
    pub fn is_registered(&self, key: &DeviceKey) -> bool {
        self.devices.contains(key)
    }

    /// Any fully gathered snapshot is good enough to reconcile against.
    #[must_use]
    pub const fn is_consistent(snapshot: &ObservedSnapshot) -> bool {
        snapshot.gathered_at.is_some()
    }
}
