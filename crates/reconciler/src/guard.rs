//! Per-device mutual exclusion.
//!
//! Each device key gets one fair single-permit semaphore, created on first
//! use. Waiters are served in arrival order. The permit is owned, so it can
//! travel into the worker task that performs the push and is released when
//! that task ends, whether it succeeded, failed or panicked.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use flowsync_core::DeviceKey;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::error::{Error, Result};

/// Held while a push for one device is in flight.
pub type DeviceGuard = OwnedSemaphorePermit;

#[derive(Debug, Default)]
pub struct DeviceGuards {
    guards: DashMap<DeviceKey, Arc<Semaphore>>,
    shut_down: AtomicBool,
}

impl DeviceGuards {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`.
    ///
    /// # Errors
    ///
    /// Returns `Error::GuardInterrupted` if the guard was closed by
    /// [`Self::remove`] or [`Self::shutdown`] before or while waiting.
    pub async fn acquire(&self, key: &DeviceKey) -> Result<DeviceGuard> {
        let interrupted = || Error::GuardInterrupted { device: key.clone() };
        if self.is_shut_down() {
            return Err(interrupted());
        }

        let semaphore = Arc::clone(
            self.guards
                .entry(key.clone())
                .or_insert_with(|| Arc::new(Semaphore::new(1)))
                .value(),
        );
        // a guard created while shutdown was closing the others
        if self.is_shut_down() {
            semaphore.close();
        }

        semaphore.acquire_owned().await.map_err(|_| interrupted())
    }

    /// Drop the guard of a departed device. Waiters are woken with an
    /// interruption; a push already holding the guard finishes normally.
    pub fn remove(&self, key: &DeviceKey) -> bool {
        self.guards
            .remove(key)
            .map(|(_, semaphore)| {
                semaphore.close();
                debug!(device = %key, "device guard removed");
            })
            .is_some()
    }

    /// Interrupt every current and future guard wait.
    pub fn shutdown(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
        self.guards.iter().for_each(|entry| entry.value().close());
        debug!(guards = self.guards.len(), "device guards shut down");
    }

    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn contains(&self, key: &DeviceKey) -> bool {
        self.guards.contains_key(key)
    }

    /// Whether a push for `key` currently holds the guard.
    #[must_use]
    pub fn is_held(&self, key: &DeviceKey) -> bool {
        self.guards
            .get(key)
            .is_some_and(|semaphore| semaphore.available_permits() == 0)
    }
}
