//! Device ownership within a cluster of controllers.

use std::sync::Arc;

use dashmap::DashSet;
use flowsync_core::DeviceKey;
use tracing::info;

use crate::registry::SyncRegistries;

/// Which devices this controller instance currently owns.
#[derive(Debug, Default)]
pub struct MastershipTracker {
    owned: DashSet<DeviceKey>,
}

impl MastershipTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` on the transition to owner.
    pub fn on_ownership_acquired(&self, key: &DeviceKey) -> bool {
        self.owned.insert(key.clone())
    }

    /// Returns `true` on the transition away from owner.
    pub fn on_ownership_lost(&self, key: &DeviceKey) -> bool {
        self.owned.remove(key).is_some()
    }

    #[must_use]
    pub fn is_owner(&self, key: &DeviceKey) -> bool {
        self.owned.contains(key)
    }

    #[must_use]
    pub fn owned_count(&self) -> usize {
        self.owned.len()
    }
}

/// Adapter handed to the cluster membership subsystem for one device.
///
/// The oracle calls [`Self::instantiate`] when this instance becomes the
/// device's owner and [`Self::close`] when it stops being one. Both may be
/// called redundantly.
#[derive(Debug, Clone)]
pub struct DeviceMastership {
    key: DeviceKey,
    registries: Arc<SyncRegistries>,
}

impl DeviceMastership {
    #[must_use]
    pub const fn new(key: DeviceKey, registries: Arc<SyncRegistries>) -> Self {
        Self { key, registries }
    }

    #[must_use]
    pub const fn key(&self) -> &DeviceKey {
        &self.key
    }

    /// Ownership acquired: the next sync is a full reconciliation.
    pub fn instantiate(&self) {
        if self.registries.mastership.on_ownership_acquired(&self.key) {
            info!(device = %self.key, "mastership acquired");
        }
        self.registries.reconciliation.register(&self.key);
    }

    /// Ownership lost: all per-device state is dropped.
    pub fn close(&self) {
        if self.registries.mastership.is_owner(&self.key) {
            info!(device = %self.key, "mastership lost");
        }
        self.registries.evict(&self.key);
    }

    #[must_use]
    pub fn is_owner(&self) -> bool {
        self.registries.mastership.is_owner(&self.key)
    }
}
