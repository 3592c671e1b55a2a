//! Node-level ports on the integration bridge: the gateway NIC that gives the
//! host a leg in the pod network, and the traffic mirror port.

use std::net::IpAddr;

use ipnet::IpNet;
use mac_address::MacAddress;
use podnet::host::{HostResult, Netlink};
use tracing::{info, warn};

use crate::command::{Privilege, exec_combined};
use crate::ovs::OvsVsctl;

pub const NODE_NIC: &str = "ovn0";
pub const MIRROR_NIC: &str = "mirror0";

/// Seconds to wait for the gateway to answer.
const GATEWAY_PING_DEADLINE: &str = "10";

/// Addressing for the node gateway NIC, as allocated by the control plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeNic {
    /// Logical switch port the NIC is correlated with.
    pub port_name: String,
    pub address: IpNet,
    pub mac: MacAddress,
    pub gateway: IpAddr,
    pub mtu: u32,
}

/// Create or refresh `ovn0` and ping the gateway to warm the datapath flow.
///
/// The ping outcome is only logged.
pub async fn configure_node_nic(
    ovs: &OvsVsctl,
    links: &dyn Netlink,
    bridge: &str,
    nic: &NodeNic,
    privilege: Privilege,
) -> HostResult<()> {
    ovs.add_internal_port(bridge, NODE_NIC, Some(&nic.port_name)).await?;
    links.replace_address(NODE_NIC, nic.address).await?;
    links.set_mac(NODE_NIC, nic.mac).await?;
    links.set_mtu(NODE_NIC, nic.mtu).await?;
    links.set_up(NODE_NIC).await?;
    info!(nic = NODE_NIC, port = %nic.port_name, address = %nic.address, "node nic configured");

    let gateway = nic.gateway.to_string();
    let args = ping_args(&gateway, nic.gateway.is_ipv6());
    match exec_combined("ping", &args, privilege).await {
        Ok(output) => info!(gateway = %nic.gateway, %output, "gateway ping"),
        Err(e) => warn!(gateway = %nic.gateway, error = %e, "gateway ping did not run"),
    }
    Ok(())
}

fn ping_args(gateway: &str, ipv6: bool) -> Vec<&str> {
    let mut args = Vec::with_capacity(4);
    if ipv6 {
        args.push("-6");
    }
    args.extend_from_slice(&["-w", GATEWAY_PING_DEADLINE, gateway]);
    args
}

/// Create or refresh `mirror0` as the output of a select-all bridge mirror.
pub async fn configure_mirror(
    ovs: &OvsVsctl,
    links: &dyn Netlink,
    bridge: &str,
    mtu: u32,
) -> HostResult<()> {
    ovs.replace_mirror(bridge, MIRROR_NIC).await?;
    links.set_mtu(MIRROR_NIC, mtu).await?;
    links.set_up(MIRROR_NIC).await?;
    info!(nic = MIRROR_NIC, bridge, "mirror port configured");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipv4_gateway_ping() {
        assert_eq!(ping_args("10.16.0.1", false), ["-w", "10", "10.16.0.1"]);
    }

    #[test]
    fn ipv6_gateway_ping_selects_family() {
        assert_eq!(ping_args("fd00::1", true), ["-6", "-w", "10", "fd00::1"]);
    }
}
