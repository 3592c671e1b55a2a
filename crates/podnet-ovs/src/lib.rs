//! Linux and Open vSwitch backend for the `podnet` engine.

mod command;
mod ip;
mod netns;
mod node;
mod ovs;
mod prerequisites;
mod sysfs;

use std::path::PathBuf;
use std::sync::Arc;

use podnet::HostBackends;

pub use command::{CommandError, Privilege, exec, exec_combined};
pub use ip::IpLinks;
pub use netns::ThreadNetnsRunner;
pub use node::{MIRROR_NIC, NODE_NIC, NodeNic, configure_mirror, configure_node_nic};
pub use ovs::{MIRROR_NAME, OvsVsctl};
pub use prerequisites::check_prerequisites;
pub use sysfs::{DEFAULT_SYSFS_ROOT, SysfsTopology};

/// The full set of host backends for this machine.
pub fn host_backends(privilege: Privilege, sysfs_root: impl Into<PathBuf>) -> HostBackends {
    let ovs = Arc::new(OvsVsctl::new(privilege));
    HostBackends {
        links: Arc::new(IpLinks::new(privilege)),
        bridge: ovs.clone(),
        qos: ovs,
        netns: Arc::new(ThreadNetnsRunner::new(privilege)),
        sriov: Arc::new(SysfsTopology::new(sysfs_root)),
    }
}
