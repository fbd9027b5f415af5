//! # flowsync-core
//!
//! Shared vocabulary for the flowsync workspace: device keys, the resource
//! tree model that desired and observed snapshots are expressed in, and the
//! core error type.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::panic)]
#![deny(clippy::expect_used)]

pub mod error;
pub mod key;
pub mod result;
pub mod tree;

pub use error::Error;
pub use key::DeviceKey;
pub use result::{Result, ResultExt};
pub use tree::{
    Action, Bucket, Flow, FlowId, Group, GroupId, GroupType, Instruction, Meter, MeterBand,
    MeterFlag, MeterId, ResourceTree, Table, TableFeatures, TableId,
};
