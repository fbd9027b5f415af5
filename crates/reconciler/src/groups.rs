//! # Group dependency ordering
//!
//! Groups may forward into other groups, so a group can only be installed
//! once everything it forwards into exists on the device, and can only be
//! removed before anything it depends on is removed. This module splits a
//! set of pending groups into ordered layers using petgraph.

use std::collections::{HashMap, HashSet};

use flowsync_core::{DeviceKey, Group, GroupId};
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use tracing::trace;

use crate::error::{Error, Result};
use crate::types::{ItemSyncBox, ItemUpdate};

/// What to do with a pending group once it is placed in a layer.
#[derive(Debug, Clone)]
enum Pending {
    Push(Group),
    Update { original: Group, updated: Group },
}

impl Pending {
    const fn group(&self) -> &Group {
        match self {
            Self::Push(group) | Self::Update { updated: group, .. } => group,
        }
    }
}

/// Dependency graph over pending groups. Edges point from a dependency to
/// the group that needs it.
#[derive(Debug)]
struct GroupDag {
    graph: DiGraph<Pending, ()>,
    node_map: HashMap<GroupId, NodeIndex>,
}

impl GroupDag {
    fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_map: HashMap::new(),
        }
    }

    fn add_node(&mut self, device: &DeviceKey, pending: Pending) -> Result<()> {
        let id = pending.group().id;
        if self.node_map.contains_key(&id) {
            return Err(Error::DuplicateGroup {
                device: device.clone(),
                group: id,
            });
        }
        let index = self.graph.add_node(pending);
        self.node_map.insert(id, index);
        Ok(())
    }

    fn add_dependency(&mut self, dependency: GroupId, dependent: GroupId) {
        if let (Some(&from), Some(&to)) =
            (self.node_map.get(&dependency), self.node_map.get(&dependent))
        {
            self.graph.update_edge(from, to, ());
        }
    }

    fn contains(&self, id: GroupId) -> bool {
        self.node_map.contains_key(&id)
    }

    /// Groups taking part in a reference loop, sorted.
    fn cycle_members(&self) -> Vec<GroupId> {
        let mut members: Vec<GroupId> = tarjan_scc(&self.graph)
            .into_iter()
            .filter(|scc| match scc.as_slice() {
                [single] => self.graph.contains_edge(*single, *single),
                _ => true,
            })
            .flatten()
            .filter_map(|index| self.graph.node_weight(index).map(|p| p.group().id))
            .collect();
        members.sort_unstable();
        members
    }

    /// Split nodes into layers: a node sits one layer above its deepest
    /// dependency. Within a layer nodes keep insertion order.
    fn into_layers(self, device: &DeviceKey) -> Result<Vec<ItemSyncBox<Group>>> {
        let order = toposort(&self.graph, None).map_err(|_| Error::CyclicGroupReference {
            device: device.clone(),
            groups: self.cycle_members(),
        })?;

        let mut depth: HashMap<NodeIndex, usize> = HashMap::with_capacity(order.len());
        for &node in &order {
            let level = self
                .graph
                .neighbors_directed(node, Direction::Incoming)
                .filter_map(|dep| depth.get(&dep))
                .map(|d| d.saturating_add(1))
                .max()
                .unwrap_or(0);
            depth.insert(node, level);
        }

        let layer_count = depth.values().max().map_or(0, |d| d.saturating_add(1));
        let mut layers: Vec<ItemSyncBox<Group>> = (0..layer_count).map(|_| ItemSyncBox::new()).collect();

        let (nodes, _) = self.graph.into_nodes_edges();
        for (position, node) in nodes.into_iter().enumerate() {
            let level = depth.get(&NodeIndex::new(position)).copied().unwrap_or(0);
            let Some(layer) = layers.get_mut(level) else {
                continue;
            };
            match node.weight {
                Pending::Push(group) => layer.to_push.push(group),
                Pending::Update { original, updated } => {
                    layer.to_update.push(ItemUpdate { original, updated });
                }
            }
        }

        Ok(layers)
    }
}

/// Direction of a group pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupPass {
    /// Desired groups against the device: adds and updates, strict references.
    Install,
    /// Device groups against the intent: only groups missing from the intent
    /// are kept. References to unknown groups are ignored, the device tree
    /// is whatever the device reported.
    Removal,
}

/// Resolve `pending` groups against `installed` into ordered layers,
/// dependencies first.
///
/// A pending group already installed and equal is skipped; if it differs it
/// becomes an update on the install pass and is skipped on the removal pass.
/// On the install pass a reference to a group that is neither installed nor
/// pending is an error. A reference loop is always an error.
///
/// # Errors
///
/// Returns `Error::CyclicGroupReference`, `Error::DanglingGroupReference`
/// or `Error::DuplicateGroup` for trees that cannot be ordered.
pub fn resolve_group_layers(
    device: &DeviceKey,
    installed: &HashMap<GroupId, &Group>,
    pending: &[Group],
    pass: GroupPass,
) -> Result<Vec<ItemSyncBox<Group>>> {
    let mut dag = GroupDag::new();

    for group in pending {
        match installed.get(&group.id) {
            Some(existing) if pass == GroupPass::Removal || *existing == group => {
                trace!(device = %device, group = %group.id, "group already in place");
            }
            Some(existing) => {
                trace!(device = %device, group = %group.id, "group differs, planned for update");
                dag.add_node(
                    device,
                    Pending::Update {
                        original: (*existing).clone(),
                        updated: group.clone(),
                    },
                )?;
            }
            None => {
                trace!(device = %device, group = %group.id, "group missing, planned for push");
                dag.add_node(device, Pending::Push(group.clone()))?;
            }
        }
    }

    let installed_ids: HashSet<GroupId> = installed.keys().copied().collect();
    let planned: Vec<GroupId> = pending
        .iter()
        .map(|g| g.id)
        .filter(|id| dag.contains(*id))
        .collect();

    for group in pending.iter().filter(|g| planned.contains(&g.id)) {
        for reference in group.referenced_groups() {
            if installed_ids.contains(&reference) {
                continue;
            }
            if !dag.contains(reference) {
                if pass == GroupPass::Removal {
                    continue;
                }
                return Err(Error::DanglingGroupReference {
                    device: device.clone(),
                    group: group.id,
                    missing: reference,
                });
            }
            dag.add_dependency(reference, group.id);
        }
    }

    dag.into_layers(device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowsync_core::{Action, Bucket, GroupType};

    fn group(id: u32, refs: &[u32]) -> Group {
        let actions = refs
            .iter()
            .map(|r| Action::Group { group_id: GroupId(*r) })
            .chain(std::iter::once(Action::Output { port: id }))
            .collect();
        Group::new(id, GroupType::All).with_bucket(Bucket::new(actions))
    }

    fn ids(layer: &ItemSyncBox<Group>) -> Vec<u32> {
        layer.to_push.iter().map(|g| g.id.0).collect()
    }

    fn key() -> DeviceKey {
        DeviceKey::new("openflow:1")
    }

    #[test]
    fn test_independent_groups_share_one_layer() {
        let pending = vec![group(1, &[]), group(2, &[]), group(3, &[])];
        let layers = resolve_group_layers(&key(), &HashMap::new(), &pending, GroupPass::Install);
        let layers = layers.unwrap_or_default();
        assert_eq!(layers.len(), 1);
        assert_eq!(layers.first().map(ids), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_chain_is_layered_by_depth() {
        // 1 -> 2 -> 3, plus 4 -> 3
        let pending = vec![group(1, &[2]), group(2, &[3]), group(3, &[]), group(4, &[3])];
        let layers = resolve_group_layers(&key(), &HashMap::new(), &pending, GroupPass::Install).unwrap_or_default();
        let layer_ids: Vec<Vec<u32>> = layers.iter().map(ids).collect();
        assert_eq!(layer_ids, vec![vec![3], vec![2, 4], vec![1]]);
    }

    #[test]
    fn test_installed_reference_needs_no_ordering() {
        let existing = group(2, &[]);
        let installed = HashMap::from([(GroupId(2), &existing)]);
        let pending = vec![group(1, &[2]), group(2, &[])];
        let layers = resolve_group_layers(&key(), &installed, &pending, GroupPass::Install).unwrap_or_default();
        assert_eq!(layers.len(), 1);
        assert_eq!(layers.first().map(ids), Some(vec![1]));
    }

    #[test]
    fn test_changed_group_becomes_update() {
        let existing = group(1, &[]);
        let installed = HashMap::from([(GroupId(1), &existing)]);
        let pending = vec![group(1, &[]).with_bucket(Bucket::new(vec![Action::Drop]))];

        let layers = resolve_group_layers(&key(), &installed, &pending, GroupPass::Install).unwrap_or_default();
        assert_eq!(layers.first().map(|l| l.to_update.len()), Some(1));

        let skipped = resolve_group_layers(&key(), &installed, &pending, GroupPass::Removal).unwrap_or_default();
        assert!(skipped.is_empty());
    }

    #[test]
    fn test_cycle_is_reported_with_members() {
        let pending = vec![group(1, &[2]), group(2, &[1]), group(3, &[])];
        let result = resolve_group_layers(&key(), &HashMap::new(), &pending, GroupPass::Install);
        assert!(
            matches!(&result, Err(Error::CyclicGroupReference { groups, .. }) if groups == &[GroupId(1), GroupId(2)]),
            "expected cycle between 1 and 2, got {result:?}"
        );
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let pending = vec![group(7, &[7])];
        let result = resolve_group_layers(&key(), &HashMap::new(), &pending, GroupPass::Install);
        assert!(matches!(result, Err(Error::CyclicGroupReference { groups, .. }) if groups == vec![GroupId(7)]));
    }

    #[test]
    fn test_dangling_reference_is_reported() {
        let pending = vec![group(1, &[9])];
        let result = resolve_group_layers(&key(), &HashMap::new(), &pending, GroupPass::Install);
        assert!(matches!(
            result,
            Err(Error::DanglingGroupReference { group: GroupId(1), missing: GroupId(9), .. })
        ));
    }

    #[test]
    fn test_removal_ignores_unknown_references() {
        let pending = vec![group(1, &[9]), group(2, &[1])];
        let layers = resolve_group_layers(&key(), &HashMap::new(), &pending, GroupPass::Removal)
            .unwrap_or_default();
        let layer_ids: Vec<Vec<u32>> = layers.iter().map(ids).collect();
        assert_eq!(layer_ids, vec![vec![1], vec![2]]);
    }

    #[test]
    fn test_duplicate_group_is_rejected() {
        let pending = vec![group(1, &[]), group(1, &[])];
        let result = resolve_group_layers(&key(), &HashMap::new(), &pending, GroupPass::Install);
        assert!(matches!(result, Err(Error::DuplicateGroup { .. })));
    }
}
