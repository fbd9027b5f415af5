//! Per-device guard and bounded asynchronous dispatch.

use std::sync::Arc;

use async_trait::async_trait;
use flowsync_core::DeviceKey;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::SyncReactor;
use crate::error::{Error, Result};
use crate::guard::DeviceGuards;
use crate::registry::PendingRequestQueue;
use crate::types::SyncRequest;

/// Serializes pushes per device and runs them on a bounded pool.
///
/// The owning call waits for the device guard, then takes whatever request
/// is queued by now (possibly newer than the one that triggered it) and
/// hands it to a worker task. The guard moves into the task and is released
/// when the task ends.
pub struct GuardedDispatch<R> {
    inner: Arc<R>,
    guards: Arc<DeviceGuards>,
    queue: Arc<PendingRequestQueue>,
    workers: Arc<Semaphore>,
}

impl<R: SyncReactor + 'static> GuardedDispatch<R> {
    #[must_use]
    pub fn new(
        inner: R,
        guards: Arc<DeviceGuards>,
        queue: Arc<PendingRequestQueue>,
        pool_size: usize,
    ) -> Self {
        Self {
            inner: Arc::new(inner),
            guards,
            queue,
            workers: Arc::new(Semaphore::new(pool_size)),
        }
    }

    /// Free worker slots right now.
    #[must_use]
    pub fn available_workers(&self) -> usize {
        self.workers.available_permits()
    }
}

#[async_trait]
impl<R: SyncReactor + 'static> SyncReactor for GuardedDispatch<R> {
    async fn syncup(&self, key: DeviceKey, _request: SyncRequest) -> Result<bool> {
        let guard = match self.guards.acquire(&key).await {
            Ok(guard) => guard,
            Err(e) => {
                self.queue.remove(&key);
                debug!(device = %key, "guard wait interrupted, dropping queued request");
                return Err(e);
            }
        };

        let Some(request) = self.queue.take(&key) else {
            debug!(device = %key, "queued request already gone");
            return Ok(true);
        };

        let inner = Arc::clone(&self.inner);
        let workers = Arc::clone(&self.workers);
        let task_key = key.clone();
        let task = tokio::spawn(async move {
            let _guard = guard;
            let _slot = workers
                .acquire_owned()
                .await
                .map_err(|_| Error::GuardInterrupted {
                    device: task_key.clone(),
                })?;
            inner.syncup(task_key, request).await
        });

        task.await.unwrap_or_else(|join_error| {
            warn!(device = %key, error = %join_error, "sync worker died");
            Err(Error::worker_failed(&key, join_error.to_string()))
        })
    }
}
