//! Device keys.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::result::Result;

/// Identifies one device's synchronization scope.
///
/// Stable for the device's connected lifetime and used as the map key for
/// every per-device registry. Cloning is cheap.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct DeviceKey(Arc<str>);

impl DeviceKey {
    /// Create a key from a node identifier such as `openflow:1`.
    pub fn new(node_id: impl AsRef<str>) -> Self {
        Self(Arc::from(node_id.as_ref()))
    }

    /// Parse a key, rejecting blank identifiers.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidDeviceKey` if the identifier is empty or contains whitespace.
    pub fn parse(node_id: &str) -> Result<Self> {
        if node_id.trim().is_empty() {
            return Err(Error::invalid_device_key("device key must not be empty"));
        }
        if node_id.chars().any(char::is_whitespace) {
            return Err(Error::invalid_device_key(format!(
                "device key '{node_id}' contains whitespace"
            )));
        }
        Ok(Self::new(node_id))
    }

    /// The raw node identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for DeviceKey {
    fn from(node_id: String) -> Self {
        Self(Arc::from(node_id))
    }
}

impl From<DeviceKey> for String {
    fn from(key: DeviceKey) -> Self {
        key.as_str().to_string()
    }
}
