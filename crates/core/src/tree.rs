//! Resource tree model.
//!
//! A [`ResourceTree`] is one snapshot of a device's forwarding configuration:
//! tables holding flows, groups (which may chain to other groups), and meters.
//! Each device has two of them at any time, the desired tree declared by the
//! operator and the observed tree reported by the device.

use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::result::Result;

/// Flow table number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableId(pub u8);

/// Flow identifier, unique within its table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlowId(pub String);

/// Group identifier, unique per device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub u32);

/// Meter identifier, unique per device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeterId(pub u32);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table-{}", self.0)
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "group-{}", self.0)
    }
}

impl fmt::Display for MeterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "meter-{}", self.0)
    }
}

impl From<&str> for FlowId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Packet action carried by instructions and group buckets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Action {
    Output { port: u32 },
    Group { group_id: GroupId },
    SetField { field: String, value: String },
    PushVlan { ethertype: u16 },
    PopVlan,
    Drop,
}

/// Flow instruction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Instruction {
    GotoTable { table_id: TableId },
    ApplyActions { actions: Vec<Action> },
    WriteActions { actions: Vec<Action> },
    WriteMetadata { value: u64, mask: u64 },
    Meter { meter_id: MeterId },
    ClearActions,
}

/// A single flow entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flow {
    pub id: FlowId,
    #[serde(default)]
    pub priority: u16,
    /// Match fields, e.g. `in_port -> 1`.
    #[serde(default)]
    pub matches: BTreeMap<String, String>,
    #[serde(default)]
    pub instructions: Vec<Instruction>,
    #[serde(default)]
    pub cookie: u64,
    #[serde(default)]
    pub idle_timeout: u16,
    #[serde(default)]
    pub hard_timeout: u16,
}

impl Flow {
    /// Create a flow with no matches and no instructions.
    pub fn new(id: impl Into<String>, priority: u16) -> Self {
        Self {
            id: FlowId(id.into()),
            priority,
            matches: BTreeMap::new(),
            instructions: Vec::new(),
            cookie: 0,
            idle_timeout: 0,
            hard_timeout: 0,
        }
    }

    /// Add a match field.
    #[must_use]
    pub fn with_match(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.matches.insert(field.into(), value.into());
        self
    }

    /// Append an instruction.
    #[must_use]
    pub fn with_instruction(mut self, instruction: Instruction) -> Self {
        self.instructions.push(instruction);
        self
    }

    /// Whether the two flows would forward identically.
    #[must_use]
    pub fn same_instructions(&self, other: &Self) -> bool {
        self.instructions == other.instructions
    }
}

/// Capabilities advertised or requested for a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableFeatures {
    pub name: String,
    pub max_entries: u32,
    #[serde(default)]
    pub metadata_match: u64,
    #[serde(default)]
    pub metadata_write: u64,
}

/// A flow table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub id: TableId,
    #[serde(default)]
    pub features: Option<TableFeatures>,
    #[serde(default)]
    pub flows: Vec<Flow>,
}

impl Table {
    /// Create an empty table.
    #[must_use]
    pub const fn new(id: u8) -> Self {
        Self {
            id: TableId(id),
            features: None,
            flows: Vec::new(),
        }
    }

    /// Append a flow.
    #[must_use]
    pub fn with_flow(mut self, flow: Flow) -> Self {
        self.flows.push(flow);
        self
    }

    /// Set the table features.
    #[must_use]
    pub fn with_features(mut self, features: TableFeatures) -> Self {
        self.features = Some(features);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupType {
    All,
    Select,
    Indirect,
    FastFailover,
}

/// One bucket of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucket {
    #[serde(default)]
    pub weight: u16,
    #[serde(default)]
    pub watch_port: Option<u32>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Bucket {
    #[must_use]
    pub const fn new(actions: Vec<Action>) -> Self {
        Self {
            weight: 0,
            watch_port: None,
            actions,
        }
    }
}

/// A group entry. Buckets may chain to other groups through
/// [`Action::Group`], which makes the groups of a tree a dependency graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub group_type: GroupType,
    #[serde(default)]
    pub buckets: Vec<Bucket>,
}

impl Group {
    #[must_use]
    pub const fn new(id: u32, group_type: GroupType) -> Self {
        Self {
            id: GroupId(id),
            group_type,
            buckets: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_bucket(mut self, bucket: Bucket) -> Self {
        self.buckets.push(bucket);
        self
    }

    /// Groups this group forwards into, deduplicated, in bucket order.
    #[must_use]
    pub fn referenced_groups(&self) -> Vec<GroupId> {
        self.buckets
            .iter()
            .flat_map(|bucket| bucket.actions.iter())
            .filter_map(|action| match action {
                Action::Group { group_id } => Some(*group_id),
                _ => None,
            })
            .unique()
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeterFlag {
    Kbps,
    Pktps,
    Burst,
    Stats,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum MeterBand {
    Drop { rate: u32, burst_size: u32 },
    DscpRemark { rate: u32, burst_size: u32, prec_level: u8 },
}

/// A meter entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Meter {
    pub id: MeterId,
    #[serde(default)]
    pub flags: Vec<MeterFlag>,
    #[serde(default)]
    pub bands: Vec<MeterBand>,
}

impl Meter {
    #[must_use]
    pub const fn new(id: u32) -> Self {
        Self {
            id: MeterId(id),
            flags: Vec::new(),
            bands: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_band(mut self, band: MeterBand) -> Self {
        self.bands.push(band);
        self
    }
}

/// Snapshot of a device's configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceTree {
    #[serde(default)]
    pub tables: Vec<Table>,
    #[serde(default)]
    pub groups: Vec<Group>,
    #[serde(default)]
    pub meters: Vec<Meter>,
}

impl ResourceTree {
    /// Create an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_table(mut self, table: Table) -> Self {
        self.tables.push(table);
        self
    }

    #[must_use]
    pub fn with_group(mut self, group: Group) -> Self {
        self.groups.push(group);
        self
    }

    #[must_use]
    pub fn with_meter(mut self, meter: Meter) -> Self {
        self.meters.push(meter);
        self
    }

    /// Look up a table by id.
    #[must_use]
    pub fn table(&self, id: TableId) -> Option<&Table> {
        self.tables.iter().find(|t| t.id == id)
    }

    /// Total number of flows across all tables.
    #[must_use]
    pub fn flow_count(&self) -> usize {
        self.tables.iter().map(|t| t.flows.len()).sum()
    }

    /// Whether the tree holds no flows, groups or meters.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.flow_count() == 0 && self.groups.is_empty() && self.meters.is_empty()
    }

    /// Parse a tree from JSON.
    ///
    /// # Errors
    ///
    /// Returns `Error::JsonParseFailed` if the document is not a valid tree.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a tree from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `Error::FileReadFailed` if the file cannot be read, or a parse error.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::file_read_failed(path, e.to_string()))?;
        Self::from_json_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chained_group() -> Group {
        Group::new(1, GroupType::All)
            .with_bucket(Bucket::new(vec![
                Action::Group { group_id: GroupId(2) },
                Action::Output { port: 3 },
            ]))
            .with_bucket(Bucket::new(vec![Action::Group { group_id: GroupId(2) }]))
    }

    #[test]
    fn test_referenced_groups_deduplicated() {
        assert_eq!(chained_group().referenced_groups(), vec![GroupId(2)]);
    }

    #[test]
    fn test_flow_count_spans_tables() {
        let tree = ResourceTree::new()
            .with_table(Table::new(0).with_flow(Flow::new("a", 1)).with_flow(Flow::new("b", 1)))
            .with_table(Table::new(1).with_flow(Flow::new("c", 1)));
        assert_eq!(tree.flow_count(), 3);
        assert!(!tree.is_empty());
    }

    #[test]
    fn test_tree_parses_from_json() {
        let json = r#"{
            "tables": [{"id": 0, "flows": [{"id": "f1", "priority": 10,
                "instructions": [{"type": "apply_actions", "actions": [{"type": "output", "port": 2}]}]}]}],
            "groups": [{"id": 5, "group_type": "indirect",
                "buckets": [{"actions": [{"type": "group", "group_id": 6}]}]}],
            "meters": [{"id": 1, "bands": [{"type": "drop", "rate": 100, "burst_size": 10}]}]
        }"#;
        let tree = ResourceTree::from_json_str(json);
        assert!(tree.is_ok());
        let tree = tree.unwrap_or_default();
        assert_eq!(tree.flow_count(), 1);
        assert_eq!(
            tree.groups.first().map(Group::referenced_groups),
            Some(vec![GroupId(6)])
        );
        assert_eq!(tree.meters.len(), 1);
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let result = ResourceTree::from_json_file(Path::new("/nonexistent/flowsync/tree.json"));
        assert!(matches!(result, Err(Error::FileReadFailed { .. })));
    }

    #[test]
    fn test_tree_reads_from_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("observed.json");
        std::fs::write(&path, r#"{"meters": [{"id": 3}]}"#)?;

        let tree = ResourceTree::from_json_file(&path)?;
        assert_eq!(tree.meters, vec![Meter::new(3)]);
        Ok(())
    }

    #[test]
    fn test_same_instructions_ignores_cookie() {
        let a = Flow::new("f", 1).with_instruction(Instruction::ClearActions);
        let mut b = a.clone();
        b.cookie = 99;
        assert!(a.same_instructions(&b));
        assert_ne!(a, b);
    }
}
