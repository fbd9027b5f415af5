//! Change listeners: turn before/after deltas of either tree into sync
//! requests.

use std::sync::Arc;

use flowsync_core::{DeviceKey, ResourceTree};
use tracing::{debug, trace};

use crate::cache::{TreeCache, TreeSource};
use crate::pipeline::SyncPipeline;
use crate::registry::{ReconciliationRegistry, SyncRegistries};
use crate::types::{ObservedSnapshot, SyncRequest, TreeOrigin};

/// Reacts to operator intent changing.
pub struct DesiredChangeListener {
    pipeline: Arc<SyncPipeline>,
    trees: Arc<TreeCache>,
}

impl DesiredChangeListener {
    #[must_use]
    pub const fn new(pipeline: Arc<SyncPipeline>, trees: Arc<TreeCache>) -> Self {
        Self { pipeline, trees }
    }

    /// Intent for `key` moved from `before` to `after`.
    ///
    /// New intent is diffed against the cached observed tree; changed or
    /// deleted intent is diffed against the previous intent.
    pub async fn on_desired_changed(
        &self,
        key: &DeviceKey,
        before: Option<Arc<ResourceTree>>,
        after: Option<Arc<ResourceTree>>,
    ) -> bool {
        self.trees.update_cache(key, TreeOrigin::Desired, after.clone());

        let request = match (before, after) {
            (None, None) => return true,
            (None, Some(added)) => {
                trace!(device = %key, "intent added");
                SyncRequest::desired_changed(Some(added), self.trees.load_observed(key))
            }
            (Some(previous), after) => {
                trace!(device = %key, deleted = after.is_none(), "intent changed");
                SyncRequest::desired_delta(after, Some(previous))
            }
        };
        self.pipeline.syncup(key.clone(), request).await
    }
}

/// Reacts to snapshots reported by the device.
pub struct ObservedChangeListener {
    pipeline: Arc<SyncPipeline>,
    trees: Arc<TreeCache>,
    registries: Arc<SyncRegistries>,
}

impl ObservedChangeListener {
    #[must_use]
    pub const fn new(
        pipeline: Arc<SyncPipeline>,
        trees: Arc<TreeCache>,
        registries: Arc<SyncRegistries>,
    ) -> Self {
        Self {
            pipeline,
            trees,
            registries,
        }
    }

    /// The device reported `snapshot`; `None` means the device is gone.
    ///
    /// Observed changes only cause a push when the device awaits a full
    /// reconciliation or a retry and the snapshot is consistent enough.
    pub async fn on_observed_changed(&self, key: &DeviceKey, snapshot: Option<ObservedSnapshot>) -> bool {
        let Some(snapshot) = snapshot else {
            debug!(device = %key, "observed tree deleted, device disconnected");
            self.registries.evict(key);
            self.trees.remove(key);
            return true;
        };

        self.trees
            .update_cache(key, TreeOrigin::Observed, Some(Arc::clone(&snapshot.tree)));

        let reconcile = self.registries.reconciliation.is_registered(key)
            && ReconciliationRegistry::is_consistent(&snapshot);
        let retry = self.registries.retry.is_consistent(key, &snapshot);
        if !reconcile && !retry {
            trace!(device = %key, "observed update needs no push");
            return true;
        }

        debug!(device = %key, reconcile, retry, "consistent snapshot, syncing");
        let request = SyncRequest::observed_changed(Some(snapshot.tree), self.trees.load_desired(key));
        self.pipeline.syncup(key.clone(), request).await
    }
}
