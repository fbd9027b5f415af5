//! Compression: coalesce bursts of triggers per device.

use std::sync::Arc;

use async_trait::async_trait;
use flowsync_core::DeviceKey;
use tracing::trace;

use super::SyncReactor;
use crate::error::Result;
use crate::registry::PendingRequestQueue;
use crate::types::SyncRequest;

/// Merges every trigger into the pending queue. Only the trigger that found
/// the device idle continues down the chain; the others return at once and
/// their change is picked up by that owner when it dequeues.
pub struct CompressionStage<R> {
    inner: R,
    queue: Arc<PendingRequestQueue>,
}

impl<R: SyncReactor> CompressionStage<R> {
    #[must_use]
    pub const fn new(inner: R, queue: Arc<PendingRequestQueue>) -> Self {
        Self { inner, queue }
    }
}

#[async_trait]
impl<R: SyncReactor> SyncReactor for CompressionStage<R> {
    async fn syncup(&self, key: DeviceKey, request: SyncRequest) -> Result<bool> {
        if !self.queue.offer(&key, request.clone()) {
            trace!(device = %key, "sync already outstanding, request compressed");
            return Ok(true);
        }
        self.inner.syncup(key, request).await
    }
}
