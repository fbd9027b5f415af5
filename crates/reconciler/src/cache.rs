//! In-memory snapshot cache of both trees per device.

use std::sync::Arc;

use dashmap::DashMap;
use flowsync_core::{DeviceKey, ResourceTree};

use crate::types::TreeOrigin;

/// Snapshot reader for the complementary side of a change.
///
/// Listeners keep it current through [`TreeSource::update_cache`] so the hot
/// path never needs a remote read.
pub trait TreeSource: Send + Sync {
    fn load_observed(&self, key: &DeviceKey) -> Option<Arc<ResourceTree>>;

    fn load_desired(&self, key: &DeviceKey) -> Option<Arc<ResourceTree>>;

    /// Replace the cached tree of one side. `None` clears it.
    fn update_cache(&self, key: &DeviceKey, origin: TreeOrigin, tree: Option<Arc<ResourceTree>>);
}

#[derive(Debug, Default)]
pub struct TreeCache {
    desired: DashMap<DeviceKey, Arc<ResourceTree>>,
    observed: DashMap<DeviceKey, Arc<ResourceTree>>,
}

impl TreeCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop both sides for a departed device.
    pub fn remove(&self, key: &DeviceKey) {
        self.desired.remove(key);
        self.observed.remove(key);
    }

    const fn side(&self, origin: TreeOrigin) -> &DashMap<DeviceKey, Arc<ResourceTree>> {
        match origin {
            TreeOrigin::Desired => &self.desired,
            TreeOrigin::Observed => &self.observed,
        }
    }
}

impl TreeSource for TreeCache {
    fn load_observed(&self, key: &DeviceKey) -> Option<Arc<ResourceTree>> {
        self.observed.get(key).map(|entry| Arc::clone(entry.value()))
    }

    fn load_desired(&self, key: &DeviceKey) -> Option<Arc<ResourceTree>> {
        self.desired.get(key).map(|entry| Arc::clone(entry.value()))
    }

    fn update_cache(&self, key: &DeviceKey, origin: TreeOrigin, tree: Option<Arc<ResourceTree>>) {
        let side = self.side(origin);
        match tree {
            Some(tree) => {
                side.insert(key.clone(), tree);
            }
            None => {
                side.remove(key);
            }
        }
    }
}
