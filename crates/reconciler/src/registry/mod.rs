//! Shared per-device bookkeeping.
//!
//! Every map here is keyed by [`DeviceKey`] and guarded per shard, so no lock
//! is ever held across a device push.

mod pending;
mod reconciliation;
mod retry;

pub use pending::PendingRequestQueue;
pub use reconciliation::ReconciliationRegistry;
pub use retry::RetryRegistry;

use std::sync::Arc;

use flowsync_core::DeviceKey;
use tracing::debug;

use crate::guard::DeviceGuards;
use crate::mastership::MastershipTracker;

/// All per-device state of one controller instance.
#[derive(Debug, Default)]
pub struct SyncRegistries {
    pub mastership: Arc<MastershipTracker>,
    pub pending: Arc<PendingRequestQueue>,
    pub retry: Arc<RetryRegistry>,
    pub reconciliation: Arc<ReconciliationRegistry>,
    pub guards: Arc<DeviceGuards>,
}

impl SyncRegistries {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything about `key`: ownership, queued request, retry and
    /// reconciliation registrations, and the guard. A push in flight keeps
    /// running but its outcome is no longer recorded.
    pub fn evict(&self, key: &DeviceKey) {
        // ownership first: RetryStage rechecks it after registering
        let was_owner = self.mastership.on_ownership_lost(key);
        let had_pending = self.pending.remove(key);
        let had_retry = self.retry.unregister_if_registered(key);
        let had_reconciliation = self.reconciliation.unregister_if_registered(key);
        self.guards.remove(key);
        debug!(
            device = %key,
            was_owner,
            had_pending,
            had_retry,
            had_reconciliation,
            "device state evicted"
        );
    }
}
