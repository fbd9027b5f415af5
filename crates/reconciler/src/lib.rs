//! Desired-vs-observed reconciliation for switch configuration.
//!
//! Each device has two resource trees: the **desired** tree the operator
//! declared and the **observed** tree the device reports. This crate keeps
//! them converged:
//!
//! - **Diff**: [`diff_trees`] turns the two trees into ordered batches of
//!   adds, updates and removals, with groups layered by reference depth.
//! - **Pipeline**: [`SyncPipeline`] wraps the diff-and-push in mastership
//!   gating, request compression, a per-device guard with a bounded worker
//!   pool, and snapshot-driven retry.
//! - **Lifecycle**: [`SyncEngine`] owns the per-device registries and routes
//!   connect, disconnect and ownership signals into them.
//!
//! # Example
//!
//! ```ignore
//! use flowsync_reconciler::{DryRunDevice, ReconcilerConfig, SyncEngine, SyncRequest};
//! use std::sync::Arc;
//!
//! let device = Arc::new(DryRunDevice::new());
//! let engine = SyncEngine::new(ReconcilerConfig::default(), device.clone(), device)?;
//!
//! let key = DeviceKey::new("openflow:1");
//! engine.on_device_connected(&key).instantiate();
//! let ok = engine
//!     .syncup(key, SyncRequest::desired_changed(Some(desired), Some(observed)))
//!     .await;
//! ```

#![forbid(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![forbid(clippy::panic)]

pub mod cache;
pub mod config;
pub mod device;
pub mod diff;
pub mod engine;
pub mod error;
pub mod groups;
pub mod guard;
pub mod listener;
pub mod mastership;
pub mod pipeline;
pub mod reactor;
pub mod registry;
pub mod strategy;
pub mod types;

pub use cache::{TreeCache, TreeSource};
pub use config::{PushStrategyKind, ReconcilerConfig};
pub use device::{DeviceOp, DeviceRpc, DryRunDevice, SnapshotElicitor};
pub use diff::{diff_trees, DiffOptions, SyncDiff};
pub use engine::SyncEngine;
pub use error::{Error, Result};
pub use guard::{DeviceGuard, DeviceGuards};
pub use listener::{DesiredChangeListener, ObservedChangeListener};
pub use mastership::{DeviceMastership, MastershipTracker};
pub use pipeline::{SyncPipeline, SyncReactor};
pub use reactor::{SyncOutcome, SyncReactorImpl};
pub use registry::{PendingRequestQueue, ReconciliationRegistry, RetryRegistry, SyncRegistries};
pub use strategy::{push_strategy, FlatBatchPush, IncrementalPush, SyncPlanPushStrategy};
pub use types::{
    CrudCounts, ItemSyncBox, ItemUpdate, ObservedSnapshot, SyncCrudCounters, SyncMode, SyncRequest,
    TreeOrigin,
};
