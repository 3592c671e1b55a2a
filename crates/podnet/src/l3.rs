//! Namespace Migrator and L3 Configurator.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;

use ipnet::IpNet;
use mac_address::MacAddress;
use tracing::{debug, info};

use crate::error::{ProvisionError, Result, Step};
use crate::host::{Netlink, NetnsRunner, Route, netns_job};
use crate::types::AddressFamily;

/// Docker's "none" network starts with IPv6 disabled namespace-wide.
pub const DISABLE_IPV6_SYSCTL: &str = "net.ipv6.conf.all.disable_ipv6";

/// Everything the in-namespace half needs. Owned so it can travel to the
/// namespace worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerNic {
    pub sandbox_id: String,
    /// Name the link arrives with.
    pub link: String,
    /// Fixed name the workload runtime expects.
    pub ifname: String,
    pub address: IpNet,
    pub gateway: IpAddr,
    pub mac: MacAddress,
}

impl ContainerNic {
    pub fn family(&self) -> AddressFamily {
        AddressFamily::of(self.address.addr())
    }
}

/// Default route for the family of `gateway`: `0.0.0.0/0` or `::/0`.
pub fn default_route(gateway: IpAddr) -> Route {
    let unspecified = match gateway {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    };
    // A zero prefix is valid for both families.
    let destination = IpNet::new(unspecified, 0).unwrap_or_else(|_| IpNet::from(unspecified));
    Route {
        destination,
        gateway,
    }
}

/// Move the container side into `netns`, then configure it there.
///
/// The move runs in the caller's namespace; everything after it runs on the
/// namespace worker provided by `runner`.
pub async fn migrate_and_configure(
    links: &dyn Netlink,
    runner: &dyn NetnsRunner,
    netns: &Path,
    nic: ContainerNic,
) -> Result<()> {
    links
        .move_to_netns(&nic.link, netns)
        .await
        .map_err(ProvisionError::os(Step::MoveToNetns, &nic.sandbox_id, &nic.link))?;
    debug!(sandbox_id = %nic.sandbox_id, link = %nic.link, netns = %netns.display(), "moved into netns");

    runner
        .run(
            netns,
            netns_job(move |links| Box::pin(async move { configure_container_nic(links, &nic).await })),
        )
        .await
}

/// Rename, address, and route the container link. Runs inside the target
/// namespace; any failure aborts the sequence.
pub async fn configure_container_nic(links: &dyn Netlink, nic: &ContainerNic) -> Result<()> {
    let id = nic.sandbox_id.as_str();
    let name = nic.ifname.as_str();

    if nic.link != nic.ifname {
        links
            .rename_link(&nic.link, name)
            .await
            .map_err(ProvisionError::os(Step::RenameLink, id, &nic.link))?;
    }

    if nic.family() == AddressFamily::IPv6 {
        links
            .set_sysctl(DISABLE_IPV6_SYSCTL, "0")
            .await
            .map_err(ProvisionError::os(Step::EnableIpv6, id, name))?;
    }

    links
        .replace_address(name, nic.address)
        .await
        .map_err(ProvisionError::os(Step::ReplaceAddress, id, name))?;
    links
        .set_mac(name, nic.mac)
        .await
        .map_err(ProvisionError::os(Step::SetMac, id, name))?;
    links
        .set_up(name)
        .await
        .map_err(ProvisionError::os(Step::SetUp, id, name))?;
    links
        .replace_route(name, &default_route(nic.gateway))
        .await
        .map_err(ProvisionError::os(Step::AddDefaultRoute, id, name))?;

    info!(sandbox_id = %id, ifname = %name, address = %nic.address, gateway = %nic.gateway, "container nic configured");
    Ok(())
}
