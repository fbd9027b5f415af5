//! # Diff engine
//!
//! Turns a target tree and a baseline tree into the ordered operations that
//! move the device from one to the other. Pure: no I/O, no locking.
//!
//! The add pass walks the target against the baseline, the removal pass
//! walks the baseline against the target. Groups are layered by reference
//! depth in both passes; see [`crate::groups`].

use std::collections::{BTreeMap, HashMap};

use flowsync_core::{DeviceKey, Flow, FlowId, Group, GroupId, Meter, MeterId, ResourceTree, TableFeatures, TableId};
use itertools::Itertools;
use serde::Serialize;
use tracing::debug;

use crate::config::ReconcilerConfig;
use crate::device::DeviceOp;
use crate::error::{Error, Result};
use crate::groups::{resolve_group_layers, GroupPass};
use crate::types::{CrudCounts, ItemSyncBox, ItemUpdate, SyncCrudCounters};

/// Knobs of the diff that come from configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffOptions {
    pub compare_flow_instructions_only: bool,
    pub push_table_features: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            compare_flow_instructions_only: false,
            push_table_features: true,
        }
    }
}

impl From<&ReconcilerConfig> for DiffOptions {
    fn from(config: &ReconcilerConfig) -> Self {
        Self {
            compare_flow_instructions_only: config.compare_flow_instructions_only,
            push_table_features: config.push_table_features,
        }
    }
}

impl DiffOptions {
    fn flows_equal(&self, target: &Flow, baseline: &Flow) -> bool {
        if self.compare_flow_instructions_only {
            target.same_instructions(baseline)
        } else {
            target == baseline
        }
    }
}

/// Everything that has to change on one device.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncDiff {
    pub table_features: Vec<(TableId, TableFeatures)>,
    /// Layers in push order; a layer only references earlier layers.
    pub groups_to_add_or_update: Vec<ItemSyncBox<Group>>,
    pub meters_to_add_or_update: ItemSyncBox<Meter>,
    pub flows_to_add_or_update: BTreeMap<TableId, ItemSyncBox<Flow>>,
    pub flows_to_remove: BTreeMap<TableId, Vec<Flow>>,
    pub meters_to_remove: Vec<Meter>,
    /// Layers in removal order; dependents come before what they reference.
    pub groups_to_remove: Vec<Vec<Group>>,
}

impl SyncDiff {
    /// Whether there is nothing to push.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table_features.is_empty()
            && self.groups_to_add_or_update.iter().all(ItemSyncBox::is_empty)
            && self.meters_to_add_or_update.is_empty()
            && self.flows_to_add_or_update.values().all(ItemSyncBox::is_empty)
            && self.flows_to_remove.values().all(Vec::is_empty)
            && self.meters_to_remove.is_empty()
            && self.groups_to_remove.iter().all(Vec::is_empty)
    }

    /// Per-kind add/update/remove counts.
    #[must_use]
    pub fn counters(&self) -> SyncCrudCounters {
        let groups_added = self.groups_to_add_or_update.iter().map(|l| l.to_push.len()).sum();
        let groups_updated = self.groups_to_add_or_update.iter().map(|l| l.to_update.len()).sum();
        SyncCrudCounters {
            flows: CrudCounts {
                added: self.flows_to_add_or_update.values().map(|b| b.to_push.len()).sum(),
                updated: self.flows_to_add_or_update.values().map(|b| b.to_update.len()).sum(),
                removed: self.flows_to_remove.values().map(Vec::len).sum(),
            },
            groups: CrudCounts {
                added: groups_added,
                updated: groups_updated,
                removed: self.groups_to_remove.iter().map(Vec::len).sum(),
            },
            meters: CrudCounts {
                added: self.meters_to_add_or_update.to_push.len(),
                updated: self.meters_to_add_or_update.to_update.len(),
                removed: self.meters_to_remove.len(),
            },
        }
    }

    /// Operations grouped into batches, in push order.
    ///
    /// Add path: table features, each group layer, meters, flows.
    /// Remove path: flows, meters, each group layer. Nothing in a batch
    /// depends on anything else in the same batch. Empty batches are left out.
    #[must_use]
    pub fn batches(&self) -> Vec<Vec<DeviceOp>> {
        let mut batches: Vec<Vec<DeviceOp>> = Vec::new();

        batches.push(
            self.table_features
                .iter()
                .map(|(table, features)| DeviceOp::SetTableFeatures {
                    table: *table,
                    features: features.clone(),
                })
                .collect(),
        );

        for layer in &self.groups_to_add_or_update {
            batches.push(
                layer
                    .to_push
                    .iter()
                    .map(|group| DeviceOp::AddGroup { group: group.clone() })
                    .chain(layer.to_update.iter().map(|u| DeviceOp::UpdateGroup {
                        original: u.original.clone(),
                        updated: u.updated.clone(),
                    }))
                    .collect(),
            );
        }

        batches.push(
            self.meters_to_add_or_update
                .to_push
                .iter()
                .map(|meter| DeviceOp::AddMeter { meter: meter.clone() })
                .chain(self.meters_to_add_or_update.to_update.iter().map(|u| {
                    DeviceOp::UpdateMeter {
                        original: u.original.clone(),
                        updated: u.updated.clone(),
                    }
                }))
                .collect(),
        );

        batches.push(
            self.flows_to_add_or_update
                .iter()
                .flat_map(|(table, flows)| {
                    flows
                        .to_push
                        .iter()
                        .map(|flow| DeviceOp::AddFlow {
                            table: *table,
                            flow: flow.clone(),
                        })
                        .chain(flows.to_update.iter().map(|u| DeviceOp::UpdateFlow {
                            table: *table,
                            original: u.original.clone(),
                            updated: u.updated.clone(),
                        }))
                })
                .collect(),
        );

        batches.push(
            self.flows_to_remove
                .iter()
                .flat_map(|(table, flows)| {
                    flows.iter().map(|flow| DeviceOp::RemoveFlow {
                        table: *table,
                        flow: flow.clone(),
                    })
                })
                .collect(),
        );

        batches.push(
            self.meters_to_remove
                .iter()
                .map(|meter| DeviceOp::RemoveMeter { meter: meter.clone() })
                .collect(),
        );

        for layer in &self.groups_to_remove {
            batches.push(
                layer
                    .iter()
                    .map(|group| DeviceOp::RemoveGroup { group: group.clone() })
                    .collect(),
            );
        }

        batches.retain(|batch| !batch.is_empty());
        batches
    }
}

/// Compute the changes that bring `baseline` to `target`.
///
/// # Errors
///
/// Returns a structural error (`is_structural()`) when the target tree's
/// groups cannot be ordered: a reference loop, a reference to an unknown
/// group, or a group id declared twice.
pub fn diff_trees(
    device: &DeviceKey,
    target: &ResourceTree,
    baseline: &ResourceTree,
    options: DiffOptions,
) -> Result<SyncDiff> {
    if let Some(group) = target.groups.iter().map(|g| g.id).duplicates().next() {
        return Err(Error::DuplicateGroup {
            device: device.clone(),
            group,
        });
    }

    let table_features = if options.push_table_features {
        resolve_table_features(target, baseline)
    } else {
        Vec::new()
    };

    let baseline_groups = index_groups(baseline);
    let groups_to_add_or_update =
        resolve_group_layers(device, &baseline_groups, &target.groups, GroupPass::Install)?;

    let target_groups = index_groups(target);
    let groups_to_remove = resolve_group_layers(device, &target_groups, &baseline.groups, GroupPass::Removal)?
        .into_iter()
        .rev()
        .map(|layer| layer.to_push)
        .collect();

    let diff = SyncDiff {
        table_features,
        groups_to_add_or_update,
        meters_to_add_or_update: resolve_meters(target, baseline),
        flows_to_add_or_update: resolve_flows(target, baseline, options),
        flows_to_remove: resolve_flow_removals(target, baseline),
        meters_to_remove: resolve_meter_removals(target, baseline),
        groups_to_remove,
    };

    debug!(device = %device, counters = ?diff.counters(), "diff computed");
    Ok(diff)
}

fn index_groups(tree: &ResourceTree) -> HashMap<GroupId, &Group> {
    tree.groups.iter().map(|g| (g.id, g)).collect()
}

fn index_meters(tree: &ResourceTree) -> HashMap<MeterId, &Meter> {
    tree.meters.iter().map(|m| (m.id, m)).collect()
}

fn index_flows(tree: &ResourceTree, table: TableId) -> HashMap<&FlowId, &Flow> {
    tree.table(table)
        .map(|t| t.flows.iter().map(|f| (&f.id, f)).collect())
        .unwrap_or_default()
}

fn resolve_table_features(target: &ResourceTree, baseline: &ResourceTree) -> Vec<(TableId, TableFeatures)> {
    target
        .tables
        .iter()
        .filter_map(|table| {
            let features = table.features.as_ref()?;
            let installed = baseline.table(table.id).and_then(|t| t.features.as_ref());
            (installed != Some(features)).then(|| (table.id, features.clone()))
        })
        .collect()
}

fn resolve_meters(target: &ResourceTree, baseline: &ResourceTree) -> ItemSyncBox<Meter> {
    let installed = index_meters(baseline);
    let mut sync_box = ItemSyncBox::new();
    for meter in &target.meters {
        match installed.get(&meter.id) {
            None => sync_box.to_push.push(meter.clone()),
            Some(existing) if *existing != meter => sync_box.to_update.push(ItemUpdate {
                original: (*existing).clone(),
                updated: meter.clone(),
            }),
            Some(_) => {}
        }
    }
    sync_box
}

fn resolve_meter_removals(target: &ResourceTree, baseline: &ResourceTree) -> Vec<Meter> {
    let wanted = index_meters(target);
    baseline
        .meters
        .iter()
        .filter(|m| !wanted.contains_key(&m.id))
        .cloned()
        .collect()
}

fn resolve_flows(
    target: &ResourceTree,
    baseline: &ResourceTree,
    options: DiffOptions,
) -> BTreeMap<TableId, ItemSyncBox<Flow>> {
    let mut per_table = BTreeMap::new();
    for table in &target.tables {
        let installed = index_flows(baseline, table.id);
        let mut sync_box = ItemSyncBox::new();
        for flow in &table.flows {
            match installed.get(&flow.id) {
                None => sync_box.to_push.push(flow.clone()),
                Some(existing) if !options.flows_equal(flow, existing) => {
                    sync_box.to_update.push(ItemUpdate {
                        original: (*existing).clone(),
                        updated: flow.clone(),
                    });
                }
                Some(_) => {}
            }
        }
        if !sync_box.is_empty() {
            per_table.insert(table.id, sync_box);
        }
    }
    per_table
}

fn resolve_flow_removals(target: &ResourceTree, baseline: &ResourceTree) -> BTreeMap<TableId, Vec<Flow>> {
    baseline
        .tables
        .iter()
        .filter_map(|table| {
            let wanted = index_flows(target, table.id);
            let stale: Vec<Flow> = table
                .flows
                .iter()
                .filter(|f| !wanted.contains_key(&f.id))
                .cloned()
                .collect();
            (!stale.is_empty()).then_some((table.id, stale))
        })
        .collect()
}
