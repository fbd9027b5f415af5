//! Core types for the reconciler.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use flowsync_core::ResourceTree;
use serde::{Deserialize, Serialize};

use crate::device::DeviceOp;

/// Which datastore a tree snapshot came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeOrigin {
    /// Operator intent.
    Desired,
    /// Device-reported state.
    Observed,
}

impl fmt::Display for TreeOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Desired => write!(f, "desired"),
            Self::Observed => write!(f, "observed"),
        }
    }
}

/// One synchronization trigger.
///
/// `after` is the tree that just changed, `before` the best-known snapshot of
/// the other side at trigger time. Either may be absent. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    after: Option<Arc<ResourceTree>>,
    after_origin: TreeOrigin,
    before: Option<Arc<ResourceTree>>,
    before_origin: TreeOrigin,
}

/// How a request is interpreted by the reactor.
#[derive(Debug, Clone, Copy)]
pub enum SyncMode<'a> {
    /// Diff intent against the device.
    Full {
        desired: Option<&'a ResourceTree>,
        observed: Option<&'a ResourceTree>,
    },
    /// Diff new intent against previous intent; the device is not consulted.
    DesiredDelta {
        after: Option<&'a ResourceTree>,
        before: Option<&'a ResourceTree>,
    },
    /// Two device snapshots and no intent: nothing to push.
    ObservedOnly,
}

impl SyncRequest {
    /// Create a request from both sides.
    #[must_use]
    pub const fn new(
        after: Option<Arc<ResourceTree>>,
        after_origin: TreeOrigin,
        before: Option<Arc<ResourceTree>>,
        before_origin: TreeOrigin,
    ) -> Self {
        Self {
            after,
            after_origin,
            before,
            before_origin,
        }
    }

    /// The desired tree changed; `observed` is the cached device snapshot.
    #[must_use]
    pub const fn desired_changed(
        desired: Option<Arc<ResourceTree>>,
        observed: Option<Arc<ResourceTree>>,
    ) -> Self {
        Self::new(desired, TreeOrigin::Desired, observed, TreeOrigin::Observed)
    }

    /// The device reported a new snapshot; `desired` is the cached intent.
    #[must_use]
    pub const fn observed_changed(
        observed: Option<Arc<ResourceTree>>,
        desired: Option<Arc<ResourceTree>>,
    ) -> Self {
        Self::new(observed, TreeOrigin::Observed, desired, TreeOrigin::Desired)
    }

    /// Intent moved from `before` to `after`.
    #[must_use]
    pub const fn desired_delta(
        after: Option<Arc<ResourceTree>>,
        before: Option<Arc<ResourceTree>>,
    ) -> Self {
        Self::new(after, TreeOrigin::Desired, before, TreeOrigin::Desired)
    }

    #[must_use]
    pub fn after(&self) -> Option<&ResourceTree> {
        self.after.as_deref()
    }

    #[must_use]
    pub const fn after_origin(&self) -> TreeOrigin {
        self.after_origin
    }

    #[must_use]
    pub fn before(&self) -> Option<&ResourceTree> {
        self.before.as_deref()
    }

    #[must_use]
    pub const fn before_origin(&self) -> TreeOrigin {
        self.before_origin
    }

    /// Classify the request.
    #[must_use]
    pub fn mode(&self) -> SyncMode<'_> {
        match (self.after_origin, self.before_origin) {
            (TreeOrigin::Desired, TreeOrigin::Observed) => SyncMode::Full {
                desired: self.after(),
                observed: self.before(),
            },
            (TreeOrigin::Observed, TreeOrigin::Desired) => SyncMode::Full {
                desired: self.before(),
                observed: self.after(),
            },
            (TreeOrigin::Desired, TreeOrigin::Desired) => SyncMode::DesiredDelta {
                after: self.after(),
                before: self.before(),
            },
            (TreeOrigin::Observed, TreeOrigin::Observed) => SyncMode::ObservedOnly,
        }
    }

    /// The newest desired tree carried by this request, if any.
    #[must_use]
    pub fn desired(&self) -> Option<Arc<ResourceTree>> {
        match (self.after_origin, self.before_origin) {
            (TreeOrigin::Desired, _) => self.after.clone(),
            (TreeOrigin::Observed, TreeOrigin::Desired) => self.before.clone(),
            (TreeOrigin::Observed, TreeOrigin::Observed) => None,
        }
    }

    /// Fold a newer trigger into this still-pending one.
    ///
    /// The incoming request replaces the side named by its `after_origin`;
    /// the other side is kept from the pending entry, because that side has
    /// not changed since it was queued. A desired delta keeps its original
    /// baseline so no intermediate intent is skipped over.
    #[must_use]
    pub fn merged_with(&self, incoming: Self) -> Self {
        match (incoming.after_origin, self.after_origin) {
            (TreeOrigin::Desired, TreeOrigin::Desired) => Self::new(
                incoming.after,
                TreeOrigin::Desired,
                self.before.clone(),
                self.before_origin,
            ),
            (TreeOrigin::Desired, TreeOrigin::Observed) => Self::new(
                incoming.after,
                TreeOrigin::Desired,
                self.after.clone(),
                TreeOrigin::Observed,
            ),
            (TreeOrigin::Observed, TreeOrigin::Desired) => Self::new(
                self.after.clone(),
                TreeOrigin::Desired,
                incoming.after,
                TreeOrigin::Observed,
            ),
            (TreeOrigin::Observed, TreeOrigin::Observed) => Self::new(
                incoming.after,
                TreeOrigin::Observed,
                self.before.clone(),
                self.before_origin,
            ),
        }
    }
}

/// An observed tree as delivered by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedSnapshot {
    pub tree: Arc<ResourceTree>,
    /// When the device finished gathering this snapshot. `None` for partial
    /// or transient updates that were not produced by a full gathering.
    pub gathered_at: Option<DateTime<Utc>>,
}

impl ObservedSnapshot {
    /// A complete snapshot gathered now.
    #[must_use]
    pub fn gathered(tree: Arc<ResourceTree>) -> Self {
        Self {
            tree,
            gathered_at: Some(Utc::now()),
        }
    }

    /// A partial update with no gathering timestamp.
    #[must_use]
    pub const fn partial(tree: Arc<ResourceTree>) -> Self {
        Self {
            tree,
            gathered_at: None,
        }
    }
}

/// Replacement of an existing item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemUpdate<T> {
    pub original: T,
    pub updated: T,
}

/// Items of one kind to push and to update in one step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemSyncBox<T> {
    pub to_push: Vec<T>,
    pub to_update: Vec<ItemUpdate<T>>,
}

impl<T> Default for ItemSyncBox<T> {
    fn default() -> Self {
        Self {
            to_push: Vec::new(),
            to_update: Vec::new(),
        }
    }
}

impl<T> ItemSyncBox<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.to_push.is_empty() && self.to_update.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.to_push.len().saturating_add(self.to_update.len())
    }
}

/// Add/update/remove counts for one resource kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CrudCounts {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

impl CrudCounts {
    #[must_use]
    pub const fn total(&self) -> usize {
        self.added
            .saturating_add(self.updated)
            .saturating_add(self.removed)
    }
}

impl fmt::Display for CrudCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "+{}/~{}/-{}", self.added, self.updated, self.removed)
    }
}

/// Per-kind counts of one synchronization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncCrudCounters {
    pub flows: CrudCounts,
    pub groups: CrudCounts,
    pub meters: CrudCounts,
}

impl SyncCrudCounters {
    #[must_use]
    pub const fn total(&self) -> usize {
        self.flows
            .total()
            .saturating_add(self.groups.total())
            .saturating_add(self.meters.total())
    }

    /// Count one operation the device accepted. Table features are not
    /// counted.
    pub fn record(&mut self, op: &DeviceOp) {
        let counts = match op {
            DeviceOp::SetTableFeatures { .. } => return,
            DeviceOp::AddGroup { .. } | DeviceOp::UpdateGroup { .. } | DeviceOp::RemoveGroup { .. } => {
                &mut self.groups
            }
            DeviceOp::AddMeter { .. } | DeviceOp::UpdateMeter { .. } | DeviceOp::RemoveMeter { .. } => {
                &mut self.meters
            }
            DeviceOp::AddFlow { .. } | DeviceOp::UpdateFlow { .. } | DeviceOp::RemoveFlow { .. } => {
                &mut self.flows
            }
        };
        let slot = match op {
            DeviceOp::AddGroup { .. } | DeviceOp::AddMeter { .. } | DeviceOp::AddFlow { .. } => {
                &mut counts.added
            }
            DeviceOp::RemoveGroup { .. } | DeviceOp::RemoveMeter { .. } | DeviceOp::RemoveFlow { .. } => {
                &mut counts.removed
            }
            _ => &mut counts.updated,
        };
        *slot = slot.saturating_add(1);
    }
}
