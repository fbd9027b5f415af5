//! Push strategies: how a computed diff reaches the device.

use std::sync::Arc;

use async_trait::async_trait;
use flowsync_core::DeviceKey;
use futures::future::join_all;
use tracing::{debug, trace};

use crate::config::PushStrategyKind;
use crate::device::{DeviceOp, DeviceRpc};
use crate::diff::SyncDiff;
use crate::error::Result;
use crate::types::SyncCrudCounters;

/// Delivers a diff to a device, honouring the batch order of
/// [`SyncDiff::batches`].
///
/// Every operation the device accepts is tallied into `accepted`, so after
/// a failure it holds what actually reached the device.
#[async_trait]
pub trait SyncPlanPushStrategy: Send + Sync {
    /// # Errors
    ///
    /// Returns the first device error; later batches are not sent.
    async fn execute(
        &self,
        device: &DeviceKey,
        diff: &SyncDiff,
        accepted: &mut SyncCrudCounters,
    ) -> Result<()>;
}

/// One RPC per item. Items of a batch go out together, then a barrier
/// separates the batch from the next one.
pub struct IncrementalPush {
    rpc: Arc<dyn DeviceRpc>,
}

impl IncrementalPush {
    #[must_use]
    pub fn new(rpc: Arc<dyn DeviceRpc>) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl SyncPlanPushStrategy for IncrementalPush {
    async fn execute(
        &self,
        device: &DeviceKey,
        diff: &SyncDiff,
        accepted: &mut SyncCrudCounters,
    ) -> Result<()> {
        for (index, batch) in diff.batches().iter().enumerate() {
            trace!(device = %device, batch = index, ops = batch.len(), "pushing batch");
            let results = join_all(batch.iter().map(|op| self.rpc.apply(device, op))).await;
            batch
                .iter()
                .zip(&results)
                .filter(|(_, result)| result.is_ok())
                .for_each(|(op, _)| accepted.record(op));
            results.into_iter().collect::<Result<Vec<()>>>()?;
            self.rpc.send_barrier(device).await?;
        }
        Ok(())
    }
}

/// Everything in one ordered batch RPC.
pub struct FlatBatchPush {
    rpc: Arc<dyn DeviceRpc>,
}

impl FlatBatchPush {
    #[must_use]
    pub fn new(rpc: Arc<dyn DeviceRpc>) -> Self {
        Self { rpc }
    }
}

#[async_trait]
impl SyncPlanPushStrategy for FlatBatchPush {
    async fn execute(
        &self,
        device: &DeviceKey,
        diff: &SyncDiff,
        accepted: &mut SyncCrudCounters,
    ) -> Result<()> {
        let batch: Vec<DeviceOp> = diff.batches().into_iter().flatten().collect();
        if batch.is_empty() {
            return Ok(());
        }
        debug!(device = %device, ops = batch.len(), "pushing flat batch");
        // the batch is applied as a whole or reported as failed
        self.rpc.process_flat_batch(device, &batch).await?;
        batch.iter().for_each(|op| accepted.record(op));
        Ok(())
    }
}

/// Build the strategy selected by configuration.
#[must_use]
pub fn push_strategy(kind: PushStrategyKind, rpc: Arc<dyn DeviceRpc>) -> Arc<dyn SyncPlanPushStrategy> {
    match kind {
        PushStrategyKind::Incremental => Arc::new(IncrementalPush::new(rpc)),
        PushStrategyKind::FlatBatch => Arc::new(FlatBatchPush::new(rpc)),
    }
}
