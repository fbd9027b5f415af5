//! Device-facing boundary: the operations the reconciler pushes and the
//! collaborators that carry them to the device.

use std::fmt;

use async_trait::async_trait;
use flowsync_core::{DeviceKey, Flow, Group, Meter, TableFeatures, TableId};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::Result;

/// A single change to push to a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DeviceOp {
    SetTableFeatures { table: TableId, features: TableFeatures },
    AddGroup { group: Group },
    UpdateGroup { original: Group, updated: Group },
    RemoveGroup { group: Group },
    AddMeter { meter: Meter },
    UpdateMeter { original: Meter, updated: Meter },
    RemoveMeter { meter: Meter },
    AddFlow { table: TableId, flow: Flow },
    UpdateFlow { table: TableId, original: Flow, updated: Flow },
    RemoveFlow { table: TableId, flow: Flow },
}

impl DeviceOp {
    /// RPC name, e.g. `add-flow`.
    #[must_use]
    pub const fn operation(&self) -> &'static str {
        match self {
            Self::SetTableFeatures { .. } => "set-table-features",
            Self::AddGroup { .. } => "add-group",
            Self::UpdateGroup { .. } => "update-group",
            Self::RemoveGroup { .. } => "remove-group",
            Self::AddMeter { .. } => "add-meter",
            Self::UpdateMeter { .. } => "update-meter",
            Self::RemoveMeter { .. } => "remove-meter",
            Self::AddFlow { .. } => "add-flow",
            Self::UpdateFlow { .. } => "update-flow",
            Self::RemoveFlow { .. } => "remove-flow",
        }
    }
}

impl fmt::Display for DeviceOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = self.operation();
        match self {
            Self::SetTableFeatures { table, .. } => write!(f, "{name} {table}"),
            Self::AddGroup { group } | Self::RemoveGroup { group } => write!(f, "{name} {}", group.id),
            Self::UpdateGroup { updated, .. } => write!(f, "{name} {}", updated.id),
            Self::AddMeter { meter } | Self::RemoveMeter { meter } => write!(f, "{name} {}", meter.id),
            Self::UpdateMeter { updated, .. } => write!(f, "{name} {}", updated.id),
            Self::AddFlow { table, flow } | Self::RemoveFlow { table, flow } => {
                write!(f, "{name} {table}/{}", flow.id)
            }
            Self::UpdateFlow { table, updated, .. } => write!(f, "{name} {table}/{}", updated.id),
        }
    }
}

/// Push calls into a device, one per resource kind and operation.
///
/// Each call resolves once the device confirmed the change or failed it;
/// timeouts are the implementation's business and surface as errors.
#[async_trait]
pub trait DeviceRpc: Send + Sync {
    async fn add_flow(&self, device: &DeviceKey, table: TableId, flow: &Flow) -> Result<()>;

    async fn update_flow(
        &self,
        device: &DeviceKey,
        table: TableId,
        original: &Flow,
        updated: &Flow,
    ) -> Result<()>;

    async fn remove_flow(&self, device: &DeviceKey, table: TableId, flow: &Flow) -> Result<()>;

    async fn add_group(&self, device: &DeviceKey, group: &Group) -> Result<()>;

    async fn update_group(&self, device: &DeviceKey, original: &Group, updated: &Group) -> Result<()>;

    async fn remove_group(&self, device: &DeviceKey, group: &Group) -> Result<()>;

    async fn add_meter(&self, device: &DeviceKey, meter: &Meter) -> Result<()>;

    async fn update_meter(&self, device: &DeviceKey, original: &Meter, updated: &Meter) -> Result<()>;

    async fn remove_meter(&self, device: &DeviceKey, meter: &Meter) -> Result<()>;

    async fn set_table_features(
        &self,
        device: &DeviceKey,
        table: TableId,
        features: &TableFeatures,
    ) -> Result<()>;

    /// Wait until the device has processed everything sent so far.
    async fn send_barrier(&self, _device: &DeviceKey) -> Result<()> {
        Ok(())
    }

    /// Submit an ordered batch. Devices without batch support get the
    /// operations one by one.
    async fn process_flat_batch(&self, device: &DeviceKey, batch: &[DeviceOp]) -> Result<()> {
        for op in batch {
            self.apply(device, op).await?;
        }
        self.send_barrier(device).await
    }

    /// Route an operation to its push call.
    async fn apply(&self, device: &DeviceKey, op: &DeviceOp) -> Result<()> {
        match op {
            DeviceOp::SetTableFeatures { table, features } => {
                self.set_table_features(device, *table, features).await
            }
            DeviceOp::AddGroup { group } => self.add_group(device, group).await,
            DeviceOp::UpdateGroup { original, updated } => {
                self.update_group(device, original, updated).await
            }
            DeviceOp::RemoveGroup { group } => self.remove_group(device, group).await,
            DeviceOp::AddMeter { meter } => self.add_meter(device, meter).await,
            DeviceOp::UpdateMeter { original, updated } => {
                self.update_meter(device, original, updated).await
            }
            DeviceOp::RemoveMeter { meter } => self.remove_meter(device, meter).await,
            DeviceOp::AddFlow { table, flow } => self.add_flow(device, *table, flow).await,
            DeviceOp::UpdateFlow {
                table,
                original,
                updated,
            } => self.update_flow(device, *table, original, updated).await,
            DeviceOp::RemoveFlow { table, flow } => self.remove_flow(device, *table, flow).await,
        }
    }
}

/// Side requests issued after a failed push. Both are fire-and-forget.
pub trait SnapshotElicitor: Send + Sync {
    /// Ask the device for a fresh, complete observed snapshot.
    fn elicit_snapshot(&self, device: &DeviceKey);

    /// Ask the device to gather statistics and state.
    fn trigger_statistics(&self, device: &DeviceKey);
}

/// Device that accepts everything and only records what it was sent.
#[derive(Debug, Default)]
pub struct DryRunDevice {
    journal: Mutex<Vec<(DeviceKey, DeviceOp)>>,
}

impl DryRunDevice {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Operations received so far, in arrival order.
    pub async fn journal(&self) -> Vec<(DeviceKey, DeviceOp)> {
        self.journal.lock().await.clone()
    }

    async fn record(&self, device: &DeviceKey, op: DeviceOp) -> Result<()> {
        info!(device = %device, op = %op, "dry-run push");
        self.journal.lock().await.push((device.clone(), op));
        Ok(())
    }
}

#[async_trait]
impl DeviceRpc for DryRunDevice {
    async fn add_flow(&self, device: &DeviceKey, table: TableId, flow: &Flow) -> Result<()> {
        self.record(device, DeviceOp::AddFlow { table, flow: flow.clone() }).await
    }

    async fn update_flow(
        &self,
        device: &DeviceKey,
        table: TableId,
        original: &Flow,
        updated: &Flow,
    ) -> Result<()> {
        let op = DeviceOp::UpdateFlow {
            table,
            original: original.clone(),
            updated: updated.clone(),
        };
        self.record(device, op).await
    }

    async fn remove_flow(&self, device: &DeviceKey, table: TableId, flow: &Flow) -> Result<()> {
        self.record(device, DeviceOp::RemoveFlow { table, flow: flow.clone() }).await
    }

    async fn add_group(&self, device: &DeviceKey, group: &Group) -> Result<()> {
        self.record(device, DeviceOp::AddGroup { group: group.clone() }).await
    }

    async fn update_group(&self, device: &DeviceKey, original: &Group, updated: &Group) -> Result<()> {
        let op = DeviceOp::UpdateGroup {
            original: original.clone(),
            updated: updated.clone(),
        };
        self.record(device, op).await
    }

    async fn remove_group(&self, device: &DeviceKey, group: &Group) -> Result<()> {
        self.record(device, DeviceOp::RemoveGroup { group: group.clone() }).await
    }

    async fn add_meter(&self, device: &DeviceKey, meter: &Meter) -> Result<()> {
        self.record(device, DeviceOp::AddMeter { meter: meter.clone() }).await
    }

    async fn update_meter(&self, device: &DeviceKey, original: &Meter, updated: &Meter) -> Result<()> {
        let op = DeviceOp::UpdateMeter {
            original: original.clone(),
            updated: updated.clone(),
        };
        self.record(device, op).await
    }

    async fn remove_meter(&self, device: &DeviceKey, meter: &Meter) -> Result<()> {
        self.record(device, DeviceOp::RemoveMeter { meter: meter.clone() }).await
    }

    async fn set_table_features(
        &self,
        device: &DeviceKey,
        table: TableId,
        features: &TableFeatures,
    ) -> Result<()> {
        let op = DeviceOp::SetTableFeatures {
            table,
            features: features.clone(),
        };
        self.record(device, op).await
    }
}

impl SnapshotElicitor for DryRunDevice {
    fn elicit_snapshot(&self, device: &DeviceKey) {
        debug!(device = %device, "dry-run: snapshot requested");
    }

    fn trigger_statistics(&self, device: &DeviceKey) {
        debug!(device = %device, "dry-run: statistics requested");
    }
}
