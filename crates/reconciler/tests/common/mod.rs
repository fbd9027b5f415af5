//! Shared fixtures for reconciler integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use flowsync_core::{
    Action, Bucket, DeviceKey, Flow, Group, GroupId, GroupType, Meter, ResourceTree, Table,
    TableFeatures, TableId,
};
use flowsync_reconciler::{
    DeviceOp, DeviceRpc, Error, ReconcilerConfig, Result, SnapshotElicitor, SyncEngine,
};
use tokio::sync::{Mutex, Semaphore};

/// Device double that records what it receives.
///
/// Tracks how many operations are executing at once, can be told to fail,
/// and can hold every operation until the test releases it.
pub struct RecordingDevice {
    journal: Mutex<Vec<(DeviceKey, DeviceOp)>>,
    attempts: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    entered: AtomicUsize,
    failing: AtomicBool,
    reject_after: AtomicUsize,
    holding: AtomicBool,
    release: Semaphore,
    flat_batches: AtomicUsize,
    elicited: AtomicUsize,
    statistics: AtomicUsize,
}

impl RecordingDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            journal: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            entered: AtomicUsize::new(0),
            failing: AtomicBool::new(false),
            reject_after: AtomicUsize::new(usize::MAX),
            holding: AtomicBool::new(false),
            release: Semaphore::new(0),
            flat_batches: AtomicUsize::new(0),
            elicited: AtomicUsize::new(0),
            statistics: AtomicUsize::new(0),
        })
    }

    pub fn fail(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Accept the first `accepted` operations, reject every later one.
    pub fn reject_after(&self, accepted: usize) {
        self.reject_after.store(accepted, Ordering::SeqCst);
    }

    /// Hold every operation until [`Self::release`] hands out a permit.
    pub fn hold(&self, holding: bool) {
        self.holding.store(holding, Ordering::SeqCst);
    }

    pub fn release(&self, operations: usize) {
        self.release.add_permits(operations);
    }

    pub async fn op_names(&self) -> Vec<String> {
        self.journal
            .lock()
            .await
            .iter()
            .map(|(_, op)| op.to_string())
            .collect()
    }

    pub async fn ops_for(&self, key: &DeviceKey) -> Vec<String> {
        self.journal
            .lock()
            .await
            .iter()
            .filter(|(device, _)| device == key)
            .map(|(_, op)| op.to_string())
            .collect()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn entered(&self) -> usize {
        self.entered.load(Ordering::SeqCst)
    }

    pub fn flat_batches(&self) -> usize {
        self.flat_batches.load(Ordering::SeqCst)
    }

    pub fn elicited(&self) -> usize {
        self.elicited.load(Ordering::SeqCst)
    }

    pub fn statistics(&self) -> usize {
        self.statistics.load(Ordering::SeqCst)
    }

    async fn record(&self, device: &DeviceKey, op: DeviceOp) -> Result<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        self.entered.fetch_add(1, Ordering::SeqCst);

        if self.holding.load(Ordering::SeqCst) {
            if let Ok(permit) = self.release.acquire().await {
                permit.forget();
            }
        } else {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        let rejected = self.failing.load(Ordering::SeqCst)
            || attempt >= self.reject_after.load(Ordering::SeqCst);
        let result = if rejected {
            Err(Error::device_rpc(device, op.operation(), "device rejected"))
        } else {
            self.journal.lock().await.push((device.clone(), op));
            Ok(())
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[async_trait]
impl DeviceRpc for RecordingDevice {
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

    async fn process_flat_batch(&self, device: &DeviceKey, batch: &[DeviceOp]) -> Result<()> {
        self.flat_batches.fetch_add(1, Ordering::SeqCst);
        for op in batch {
            self.apply(device, op).await?;
        }
        Ok(())
    }
}

impl SnapshotElicitor for RecordingDevice {
    fn elicit_snapshot(&self, _device: &DeviceKey) {
        self.elicited.fetch_add(1, Ordering::SeqCst);
    }

    fn trigger_statistics(&self, _device: &DeviceKey) {
        self.statistics.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn engine(device: &Arc<RecordingDevice>) -> Result<SyncEngine> {
    engine_with(device, ReconcilerConfig::default())
}

pub fn engine_with(device: &Arc<RecordingDevice>, config: ReconcilerConfig) -> Result<SyncEngine> {
    SyncEngine::new(config, device.clone(), device.clone())
}

/// Connect `key` and make this instance its owner.
pub fn owned_device(engine: &SyncEngine, name: &str) -> DeviceKey {
    let key = DeviceKey::new(name);
    engine.on_device_connected(&key).instantiate();
    key
}

pub fn meters(ids: &[u32]) -> Arc<ResourceTree> {
    Arc::new(
        ids.iter()
            .fold(ResourceTree::new(), |tree, id| tree.with_meter(Meter::new(*id))),
    )
}

pub fn empty() -> Arc<ResourceTree> {
    Arc::new(ResourceTree::new())
}

/// Group `id` whose single bucket forwards into `refs`.
pub fn chained_group(id: u32, refs: &[u32]) -> Group {
    let actions = refs
        .iter()
        .map(|r| Action::Group { group_id: GroupId(*r) })
        .chain(std::iter::once(Action::Output { port: id }))
        .collect();
    Group::new(id, GroupType::All).with_bucket(Bucket::new(actions))
}

pub fn flows(table: u8, ids: &[&str]) -> Table {
    ids.iter()
        .fold(Table::new(table), |t, id| t.with_flow(Flow::new(*id, 10)))
}

/// Poll `condition` until it holds or a second passes.
pub async fn eventually(condition: impl Fn() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
