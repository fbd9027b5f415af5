//! # Sync pipeline
//!
//! The stages are composed statically, outermost first:
//!
//! ```text
//! MastershipGate        not owner -> done
//!   CompressionStage    already outstanding -> merged, done
//!     GuardedDispatch   wait for device guard, dequeue, run on worker pool
//!       MastershipGate  owner again right before the push (optional)
//!         RetryStage    failure -> retry registry + snapshot request
//!           SyncReactorImpl  diff and push
//! ```

mod cluster;
mod compression;
mod dispatch;
mod retry;

pub use cluster::MastershipGate;
pub use compression::CompressionStage;
pub use dispatch::GuardedDispatch;
pub use retry::RetryStage;

use std::sync::Arc;

use async_trait::async_trait;
use flowsync_core::DeviceKey;
use tracing::warn;

use crate::cache::TreeSource;
use crate::config::ReconcilerConfig;
use crate::device::{DeviceRpc, SnapshotElicitor};
use crate::diff::DiffOptions;
use crate::error::Result;
use crate::reactor::SyncReactorImpl;
use crate::registry::SyncRegistries;
use crate::strategy::push_strategy;
use crate::types::SyncRequest;

/// One stage of the pipeline.
///
/// `Ok(true)` means the device is (or will be made) consistent with the
/// request, `Ok(false)` a transient failure. `Err` is for failures the stage
/// could not classify; the pipeline entry point turns them into `false`.
#[async_trait]
pub trait SyncReactor: Send + Sync {
    async fn syncup(&self, key: DeviceKey, request: SyncRequest) -> Result<bool>;
}

type Stages = MastershipGate<
    CompressionStage<GuardedDispatch<MastershipGate<RetryStage<SyncReactorImpl>>>>,
>;

/// Entry point for change listeners.
pub struct SyncPipeline {
    stages: Stages,
}

impl SyncPipeline {
    /// Wire the stages around a device.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidConfig` if `config` does not validate.
    pub fn new(
        config: &ReconcilerConfig,
        registries: &SyncRegistries,
        rpc: Arc<dyn DeviceRpc>,
        trees: Arc<dyn TreeSource>,
        elicitor: Arc<dyn SnapshotElicitor>,
    ) -> Result<Self> {
        config.validate()?;

        let reactor = SyncReactorImpl::new(
            push_strategy(config.push_strategy, rpc),
            trees,
            Arc::clone(&registries.reconciliation),
            DiffOptions::from(config),
        );
        let retry = RetryStage::new(
            reactor,
            Arc::clone(&registries.retry),
            Arc::clone(&registries.mastership),
            elicitor,
        );
        let recheck = if config.recheck_ownership_before_push {
            MastershipGate::new(retry, Arc::clone(&registries.mastership), "pre-push")
        } else {
            MastershipGate::bypassed(retry, Arc::clone(&registries.mastership), "pre-push")
        };
        let dispatch = GuardedDispatch::new(
            recheck,
            Arc::clone(&registries.guards),
            Arc::clone(&registries.pending),
            config.worker_pool_size,
        );
        let compression = CompressionStage::new(dispatch, Arc::clone(&registries.pending));
        let stages = MastershipGate::new(compression, Arc::clone(&registries.mastership), "entry");

        Ok(Self { stages })
    }

    /// Synchronize `key` with `request`. Resolves to `false` only when the
    /// push failed; every error is logged and folded into that.
    pub async fn syncup(&self, key: DeviceKey, request: SyncRequest) -> bool {
        match self.stages.syncup(key.clone(), request).await {
            Ok(done) => done,
            Err(e) => {
                warn!(device = %key, error = %e, "sync aborted");
                false
            }
        }
    }
}
