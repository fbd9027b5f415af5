//! Lifecycle facade tying the pipeline, registries and listeners together.

use std::sync::Arc;

use flowsync_core::{DeviceKey, ResourceTree};
use tracing::info;

use crate::cache::TreeCache;
use crate::config::ReconcilerConfig;
use crate::device::{DeviceRpc, SnapshotElicitor};
use crate::error::Result;
use crate::listener::{DesiredChangeListener, ObservedChangeListener};
use crate::mastership::DeviceMastership;
use crate::pipeline::SyncPipeline;
use crate::registry::SyncRegistries;
use crate::types::{ObservedSnapshot, SyncRequest};

/// One controller instance's synchronization engine.
pub struct SyncEngine {
    config: ReconcilerConfig,
    registries: Arc<SyncRegistries>,
    cache: Arc<TreeCache>,
    pipeline: Arc<SyncPipeline>,
    desired: DesiredChangeListener,
    observed: ObservedChangeListener,
}

impl SyncEngine {
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if `config` does not validate.
    pub fn new(
        config: ReconcilerConfig,
        rpc: Arc<dyn DeviceRpc>,
        elicitor: Arc<dyn SnapshotElicitor>,
    ) -> Result<Self> {
        let registries = Arc::new(SyncRegistries::new());
        let cache = Arc::new(TreeCache::new());
        let pipeline = Arc::new(SyncPipeline::new(
            &config,
            &registries,
            rpc,
            cache.clone(),
            elicitor,
        )?);

        let desired = DesiredChangeListener::new(Arc::clone(&pipeline), Arc::clone(&cache));
        let observed =
            ObservedChangeListener::new(Arc::clone(&pipeline), Arc::clone(&cache), Arc::clone(&registries));

        info!(
            workers = config.worker_pool_size,
            strategy = %config.push_strategy,
            "sync engine ready"
        );
        Ok(Self {
            config,
            registries,
            cache,
            pipeline,
            desired,
            observed,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    #[must_use]
    pub fn registries(&self) -> &SyncRegistries {
        &self.registries
    }

    #[must_use]
    pub fn cache(&self) -> &TreeCache {
        &self.cache
    }

    /// A device connected; the returned handle goes to the ownership oracle.
    #[must_use]
    pub fn on_device_connected(&self, key: &DeviceKey) -> DeviceMastership {
        info!(device = %key, "device connected");
        self.mastership_for(key)
    }

    /// Ownership adapter for `key`.
    #[must_use]
    pub fn mastership_for(&self, key: &DeviceKey) -> DeviceMastership {
        DeviceMastership::new(key.clone(), Arc::clone(&self.registries))
    }

    /// A device disconnected: drop every trace of it.
    pub fn on_device_disconnected(&self, key: &DeviceKey) {
        info!(device = %key, "device disconnected");
        self.registries.evict(key);
        self.cache.remove(key);
    }

    /// Run one request through the pipeline.
    pub async fn syncup(&self, key: DeviceKey, request: SyncRequest) -> bool {
        self.pipeline.syncup(key, request).await
    }

    /// Forward a desired-tree change.
    pub async fn desired_changed(
        &self,
        key: &DeviceKey,
        before: Option<Arc<ResourceTree>>,
        after: Option<Arc<ResourceTree>>,
    ) -> bool {
        self.desired.on_desired_changed(key, before, after).await
    }

    /// Forward an observed-tree change.
    pub async fn observed_changed(&self, key: &DeviceKey, snapshot: Option<ObservedSnapshot>) -> bool {
        self.observed.on_observed_changed(key, snapshot).await
    }

    /// Interrupt guard waits; pushes in flight finish on their own.
    pub fn shutdown(&self) {
        info!("sync engine shutting down");
        self.registries.guards.shutdown();
    }
}
