//! Diff-and-push: the innermost stage of the pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use flowsync_core::{DeviceKey, ResourceTree};
use tracing::{debug, info, warn};

use crate::cache::TreeSource;
use crate::diff::{diff_trees, DiffOptions, SyncDiff};
use crate::error::Result;
use crate::pipeline::SyncReactor;
use crate::registry::ReconciliationRegistry;
use crate::strategy::SyncPlanPushStrategy;
use crate::types::{SyncCrudCounters, SyncMode, SyncRequest};

/// What a single diff-and-push did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Nothing was pushed: no baseline to diff against, or an observed-only
    /// trigger.
    Skipped,
    /// The trees already agree.
    InSync,
    /// Every batch was accepted; the counts are what the device applied.
    Pushed(SyncCrudCounters),
    /// The device rejected a batch; the counts cover only the operations it
    /// accepted before that.
    Failed(SyncCrudCounters),
}

impl SyncOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

/// Computes the diff for a request and pushes it with the configured
/// strategy.
pub struct SyncReactorImpl {
    strategy: Arc<dyn SyncPlanPushStrategy>,
    trees: Arc<dyn TreeSource>,
    reconciliation: Arc<ReconciliationRegistry>,
    options: DiffOptions,
}

impl SyncReactorImpl {
    #[must_use]
    pub fn new(
        strategy: Arc<dyn SyncPlanPushStrategy>,
        trees: Arc<dyn TreeSource>,
        reconciliation: Arc<ReconciliationRegistry>,
        options: DiffOptions,
    ) -> Self {
        Self {
            strategy,
            trees,
            reconciliation,
            options,
        }
    }

    /// Diff and push one request.
    ///
    /// A device awaiting reconciliation always gets a full diff against the
    /// cached observed tree, whatever the request says.
    ///
    /// # Errors
    ///
    /// Returns a structural error when the target tree cannot be ordered.
    /// Device failures are reported as [`SyncOutcome::Failed`].
    pub async fn synchronize(&self, key: &DeviceKey, request: &SyncRequest) -> Result<SyncOutcome> {
        let Some(diff) = self.plan(key, request)? else {
            return Ok(SyncOutcome::Skipped);
        };
        if diff.is_empty() {
            debug!(device = %key, "device already in sync");
            return Ok(SyncOutcome::InSync);
        }

        let planned = diff.counters().total();
        let mut accepted = SyncCrudCounters::default();
        match self.strategy.execute(key, &diff, &mut accepted).await {
            Ok(()) => {
                info!(
                    device = %key,
                    flows = %accepted.flows,
                    groups = %accepted.groups,
                    meters = %accepted.meters,
                    "sync finished"
                );
                Ok(SyncOutcome::Pushed(accepted))
            }
            Err(e) if e.is_structural() => Err(e),
            Err(e) => {
                warn!(
                    device = %key,
                    error = %e,
                    planned,
                    accepted = accepted.total(),
                    "sync push failed"
                );
                Ok(SyncOutcome::Failed(accepted))
            }
        }
    }

    fn plan(&self, key: &DeviceKey, request: &SyncRequest) -> Result<Option<SyncDiff>> {
        let empty = ResourceTree::default();
        match request.mode() {
            SyncMode::Full { desired, observed } => self.full_diff(key, desired, observed),
            SyncMode::DesiredDelta { after, .. } if self.reconciliation.is_registered(key) => {
                debug!(device = %key, "reconciliation pending, upgrading delta to full diff");
                let observed = self.trees.load_observed(key);
                self.full_diff(key, Some(after.unwrap_or(&empty)), observed.as_deref())
            }
            SyncMode::DesiredDelta { after, before } => {
                let diff = diff_trees(
                    key,
                    after.unwrap_or(&empty),
                    before.unwrap_or(&empty),
                    self.options,
                )?;
                Ok(Some(diff))
            }
            SyncMode::ObservedOnly => {
                debug!(device = %key, "observed-only trigger, nothing to push");
                Ok(None)
            }
        }
    }

    fn full_diff(
        &self,
        key: &DeviceKey,
        desired: Option<&ResourceTree>,
        observed: Option<&ResourceTree>,
    ) -> Result<Option<SyncDiff>> {
        let Some(observed) = observed else {
            debug!(device = %key, "no observed baseline yet, skipping sync");
            return Ok(None);
        };
        let Some(desired) = desired else {
            debug!(device = %key, "no desired tree, skipping sync");
            return Ok(None);
        };
        if self.reconciliation.unregister_if_registered(key) {
            info!(device = %key, "full reconciliation");
        }
        diff_trees(key, desired, observed, self.options).map(Some)
    }
}

#[async_trait]
impl SyncReactor for SyncReactorImpl {
    async fn syncup(&self, key: DeviceKey, request: SyncRequest) -> Result<bool> {
        self.synchronize(&key, &request)
            .await
            .map(|outcome| outcome.is_success())
    }
}
