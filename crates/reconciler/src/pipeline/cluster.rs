//! Mastership gate.

use std::sync::Arc;

use async_trait::async_trait;
use flowsync_core::DeviceKey;
use tracing::debug;

use super::SyncReactor;
use crate::error::Result;
use crate::mastership::MastershipTracker;
use crate::types::SyncRequest;

/// Passes a request on only when this instance owns the device. Anything
/// else resolves to success untouched: the owner does the work.
pub struct MastershipGate<R> {
    inner: R,
    mastership: Arc<MastershipTracker>,
    enforced: bool,
    stage: &'static str,
}

impl<R: SyncReactor> MastershipGate<R> {
    #[must_use]
    pub fn new(inner: R, mastership: Arc<MastershipTracker>, stage: &'static str) -> Self {
        Self {
            inner,
            mastership,
            enforced: true,
            stage,
        }
    }

    /// A gate that lets everything through.
    #[must_use]
    pub fn bypassed(inner: R, mastership: Arc<MastershipTracker>, stage: &'static str) -> Self {
        Self {
            enforced: false,
            ..Self::new(inner, mastership, stage)
        }
    }
}

#[async_trait]
impl<R: SyncReactor> SyncReactor for MastershipGate<R> {
    async fn syncup(&self, key: DeviceKey, request: SyncRequest) -> Result<bool> {
        if self.enforced && !self.mastership.is_owner(&key) {
            debug!(device = %key, stage = self.stage, "not owner, skipping");
            return Ok(true);
        }
        self.inner.syncup(key, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting(AtomicUsize);

    #[async_trait]
    impl SyncReactor for Arc<Counting> {
        async fn syncup(&self, _key: DeviceKey, _request: SyncRequest) -> Result<bool> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_non_owner_short_circuits() -> Result<()> {
        let calls = Arc::new(Counting::default());
        let mastership = Arc::new(MastershipTracker::new());
        let gate = MastershipGate::new(Arc::clone(&calls), Arc::clone(&mastership), "test");
        let key = DeviceKey::new("openflow:1");

        assert!(gate.syncup(key.clone(), SyncRequest::desired_changed(None, None)).await?);
        assert_eq!(calls.0.load(Ordering::SeqCst), 0);

        mastership.on_ownership_acquired(&key);
        assert!(!gate.syncup(key, SyncRequest::desired_changed(None, None)).await?);
        assert_eq!(calls.0.load(Ordering::SeqCst), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_bypassed_gate_always_forwards() -> Result<()> {
        let calls = Arc::new(Counting::default());
        let gate = MastershipGate::bypassed(Arc::clone(&calls), Arc::new(MastershipTracker::new()), "test");

        gate.syncup(DeviceKey::new("openflow:1"), SyncRequest::desired_changed(None, None))
            .await?;
        assert_eq!(calls.0.load(Ordering::SeqCst), 1);
        Ok(())
    }
}
