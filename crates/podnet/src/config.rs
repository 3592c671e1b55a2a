use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ProvisionError, Result};
use crate::naming::IFNAME_MAX_LEN;

pub const DEFAULT_BRIDGE: &str = "br-int";
pub const DEFAULT_MTU: u32 = 1400;
/// kubelet inspects this interface; any other name makes it recreate the pod.
pub const DEFAULT_CONTAINER_IFNAME: &str = "eth0";
pub const DEFAULT_CHECKPOINT_PATH: &str =
    "/var/lib/kubelet/device-plugins/kubelet_internal_checkpoint";
pub const DEFAULT_HARDWARE_RESOURCES: &[&str] = &[
    "mellanox.com/cx5_sriov_switchdev",
    "mellanox.com/cx4lx_sriov_switchdev",
];

const MIN_MTU: u32 = 68;
const MAX_MTU: u32 = 65535;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Integration bridge every pod port is attached to.
    pub bridge: String,
    pub mtu: u32,
    pub container_ifname: String,
    /// kubelet device-plugin checkpoint. `None` disables device lookup.
    pub checkpoint_path: Option<PathBuf>,
    /// Device-plugin resource names that denote SR-IOV switchdev VFs.
    pub hardware_resources: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bridge: DEFAULT_BRIDGE.to_string(),
            mtu: DEFAULT_MTU,
            container_ifname: DEFAULT_CONTAINER_IFNAME.to_string(),
            checkpoint_path: Some(PathBuf::from(DEFAULT_CHECKPOINT_PATH)),
            hardware_resources: DEFAULT_HARDWARE_RESOURCES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.bridge.is_empty() {
            return Err(ProvisionError::InvalidRequest(
                "bridge name must not be empty".into(),
            ));
        }
        if !(MIN_MTU..=MAX_MTU).contains(&self.mtu) {
            return Err(ProvisionError::InvalidRequest(format!(
                "mtu {} outside {MIN_MTU}..={MAX_MTU}",
                self.mtu
            )));
        }
        if self.container_ifname.is_empty() || self.container_ifname.len() > IFNAME_MAX_LEN {
            return Err(ProvisionError::InvalidRequest(format!(
                "container interface name {:?} must be 1..={IFNAME_MAX_LEN} bytes",
                self.container_ifname
            )));
        }
        Ok(())
    }
}
