//! Retry bookkeeping around the push.

use std::sync::Arc;

use async_trait::async_trait;
use flowsync_core::DeviceKey;
use tracing::{debug, info, warn};

use super::SyncReactor;
use crate::device::SnapshotElicitor;
use crate::error::Result;
use crate::mastership::MastershipTracker;
use crate::registry::RetryRegistry;
use crate::types::SyncRequest;

/// Records failures for snapshot-driven retry.
///
/// Success clears the device's retry entry. A failure registers it and asks
/// the device for a fresh snapshot and statistics; the retry itself happens
/// when that snapshot arrives, never on a timer. Structural errors are not
/// registered: the same tree would fail the same way.
pub struct RetryStage<R> {
    inner: R,
    retry: Arc<RetryRegistry>,
    mastership: Arc<MastershipTracker>,
    elicitor: Arc<dyn SnapshotElicitor>,
}

impl<R: SyncReactor> RetryStage<R> {
    #[must_use]
    pub fn new(
        inner: R,
        retry: Arc<RetryRegistry>,
        mastership: Arc<MastershipTracker>,
        elicitor: Arc<dyn SnapshotElicitor>,
    ) -> Self {
        Self {
            inner,
            retry,
            mastership,
            elicitor,
        }
    }

    fn register_failure(&self, key: &DeviceKey) {
        // eviction drops ownership before retries: recheck after the insert
        let at = self.retry.register(key);
        if !self.mastership.is_owner(key) {
            self.retry.unregister_if_registered(key);
            debug!(device = %key, "device left during the push, retry dropped");
            return;
        }
        info!(device = %key, registered_at = %at, "sync failed, waiting for fresh snapshot");
        self.elicitor.elicit_snapshot(key);
        self.elicitor.trigger_statistics(key);
    }
}

#[async_trait]
impl<R: SyncReactor> SyncReactor for RetryStage<R> {
    async fn syncup(&self, key: DeviceKey, request: SyncRequest) -> Result<bool> {
        match self.inner.syncup(key.clone(), request).await {
            Ok(true) => {
                if self.retry.unregister_if_registered(&key) {
                    info!(device = %key, "retry succeeded");
                }
                Ok(true)
            }
            Ok(false) => {
                self.register_failure(&key);
                Ok(false)
            }
            Err(e) if e.is_structural() => {
                warn!(device = %key, error = %e, "structural error, not retrying");
                Ok(false)
            }
            Err(e) => {
                warn!(device = %key, error = %e, "sync errored");
                self.register_failure(&key);
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Elicitations(AtomicUsize);

    impl SnapshotElicitor for Elicitations {
        fn elicit_snapshot(&self, _device: &DeviceKey) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }

        fn trigger_statistics(&self, _device: &DeviceKey) {}
    }

    /// Returns the queued results in order.
    struct Scripted(Mutex<Vec<Result<bool>>>);

    #[async_trait]
    impl SyncReactor for Scripted {
        async fn syncup(&self, _key: DeviceKey, _request: SyncRequest) -> Result<bool> {
            let next = self.0.lock().ok().and_then(|mut results| results.pop());
            next.unwrap_or(Ok(true))
        }
    }

    fn stage(results: Vec<Result<bool>>) -> (RetryStage<Scripted>, Arc<RetryRegistry>, Arc<Elicitations>, DeviceKey) {
        let retry = Arc::new(RetryRegistry::new());
        let mastership = Arc::new(MastershipTracker::new());
        let elicitor = Arc::new(Elicitations::default());
        let key = DeviceKey::new("openflow:1");
        mastership.on_ownership_acquired(&key);

        let mut script = results;
        script.reverse();
        let stage = RetryStage::new(
            Scripted(Mutex::new(script)),
            Arc::clone(&retry),
            mastership,
            elicitor.clone(),
        );
        (stage, retry, elicitor, key)
    }

    #[tokio::test]
    async fn test_failure_registers_and_success_clears() -> Result<()> {
        let (stage, retry, elicitor, key) = stage(vec![Ok(false), Ok(true)]);
        let request = || SyncRequest::desired_changed(None, None);

        assert!(!stage.syncup(key.clone(), request()).await?);
        assert!(retry.is_registered(&key));
        assert_eq!(elicitor.0.load(Ordering::SeqCst), 1);

        assert!(stage.syncup(key.clone(), request()).await?);
        assert!(!retry.is_registered(&key));
        Ok(())
    }

    #[tokio::test]
    async fn test_structural_error_is_not_registered() -> Result<()> {
        let cycle = Error::CyclicGroupReference {
            device: DeviceKey::new("openflow:1"),
            groups: vec![],
        };
        let (stage, retry, elicitor, key) = stage(vec![Err(cycle)]);

        assert!(!stage.syncup(key.clone(), SyncRequest::desired_changed(None, None)).await?);
        assert!(!retry.is_registered(&key));
        assert_eq!(elicitor.0.load(Ordering::SeqCst), 0);
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_failure_racing_eviction_leaves_no_retry() -> Result<()> {
        let key = DeviceKey::new("openflow:1");
        for _ in 0..200 {
            let retry = Arc::new(RetryRegistry::new());
            let mastership = Arc::new(MastershipTracker::new());
            mastership.on_ownership_acquired(&key);
            let stage = Arc::new(RetryStage::new(
                Scripted(Mutex::new(vec![Ok(false)])),
                Arc::clone(&retry),
                Arc::clone(&mastership),
                Arc::new(Elicitations::default()),
            ));

            let failing = {
                let stage = Arc::clone(&stage);
                let key = key.clone();
                tokio::spawn(async move { stage.syncup(key, SyncRequest::desired_changed(None, None)).await })
            };
            // same order as SyncRegistries::evict
            mastership.on_ownership_lost(&key);
            retry.unregister_if_registered(&key);

            assert!(matches!(failing.await, Ok(Ok(false))));
            assert!(!retry.is_registered(&key));
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_failure_after_disconnect_is_not_registered() -> Result<()> {
        let retry = Arc::new(RetryRegistry::new());
        let mastership = Arc::new(MastershipTracker::new());
        let elicitor = Arc::new(Elicitations::default());
        let key = DeviceKey::new("openflow:1");
        let stage = RetryStage::new(
            Scripted(Mutex::new(vec![Ok(false)])),
            Arc::clone(&retry),
            mastership,
            elicitor.clone(),
        );

        assert!(!stage.syncup(key.clone(), SyncRequest::desired_changed(None, None)).await?);
        assert!(!retry.is_registered(&key));
        assert_eq!(elicitor.0.load(Ordering::SeqCst), 0);
        Ok(())
    }
}
