//! Error types for the reconciler crate.

use flowsync_core::{DeviceKey, GroupId};
use thiserror::Error;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciler error types.
#[derive(Debug, Error)]
pub enum Error {
    /// Groups reference each other in a loop and cannot be ordered.
    #[error("cyclic group reference on {device}: {groups:?}")]
    CyclicGroupReference { device: DeviceKey, groups: Vec<GroupId> },

    /// A group forwards into a group that is neither installed nor pending.
    #[error("group {group} on {device} references unknown {missing}")]
    DanglingGroupReference {
        device: DeviceKey,
        group: GroupId,
        missing: GroupId,
    },

    /// The same group id appears twice in one tree.
    #[error("duplicate {group} in tree for {device}")]
    DuplicateGroup { device: DeviceKey, group: GroupId },

    /// A device RPC reported failure.
    #[error("{operation} on {device} failed: {reason}")]
    DeviceRpc {
        device: DeviceKey,
        operation: String,
        reason: String,
    },

    /// Waiting for the device guard was interrupted by shutdown or disconnect.
    #[error("guard wait for {device} interrupted")]
    GuardInterrupted { device: DeviceKey },

    /// The worker task running a push died.
    #[error("sync worker for {device} failed: {reason}")]
    WorkerFailed { device: DeviceKey, reason: String },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error(transparent)]
    Core(#[from] flowsync_core::Error),
}

impl Error {
    /// Create a device RPC error.
    pub fn device_rpc(
        device: &DeviceKey,
        operation: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::DeviceRpc {
            device: device.clone(),
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create a worker failure error.
    pub fn worker_failed(device: &DeviceKey, reason: impl Into<String>) -> Self {
        Self::WorkerFailed {
            device: device.clone(),
            reason: reason.into(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Structural errors describe a tree that can never be pushed as-is.
    /// Retrying them only repeats the failure.
    #[must_use]
    pub const fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::CyclicGroupReference { .. }
                | Self::DanglingGroupReference { .. }
                | Self::DuplicateGroup { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_is_structural() {
        let err = Error::CyclicGroupReference {
            device: DeviceKey::new("openflow:1"),
            groups: vec![GroupId(1), GroupId(2)],
        };
        assert!(err.is_structural());
        assert!(err.to_string().contains("openflow:1"));
    }

    #[test]
    fn test_rpc_failure_is_transient() {
        let err = Error::device_rpc(&DeviceKey::new("openflow:2"), "add-flow", "timeout");
        assert!(!err.is_structural());
        assert!(err.to_string().contains("add-flow"));
        assert!(err.to_string().contains("timeout"));
    }
}
