//! Narrow interfaces to shared host state.
//!
//! The engine never touches the kernel, the bridge, or sysfs directly; it goes
//! through these traits so that every primitive is individually atomic and
//! idempotent, and so that no cross-request locking is needed.

use std::net::IpAddr;
use std::path::Path;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use ipnet::IpNet;
use mac_address::MacAddress;

use crate::error::{HostError, ProvisionError};
use crate::pci::PciAddress;
use crate::types::{Bandwidth, BridgePort};

pub type HostResult<T> = std::result::Result<T, HostError>;

/// How a link came to exist, which decides how teardown disposes of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    /// Software veth; deleting one end removes the pair.
    Veth,
    /// Hardware-backed netdevice (VF or representor); cannot be deleted.
    Device,
}

/// A route via a gateway, installed with global scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub destination: IpNet,
    pub gateway: IpAddr,
}

/// Kernel link primitives, bound to whichever network namespace the
/// implementation is running in.
#[async_trait]
pub trait Netlink: Send + Sync {
    async fn add_veth(&self, name: &str, peer: &str, mtu: u32) -> HostResult<()>;
    /// Fails with [`HostError::LinkNotFound`] when `name` does not exist.
    async fn delete_link(&self, name: &str) -> HostResult<()>;
    /// `None` when no link called `name` exists.
    async fn link_kind(&self, name: &str) -> HostResult<Option<LinkKind>>;
    /// Sets the link down first; the kernel refuses to rename a running link.
    async fn rename_link(&self, name: &str, new_name: &str) -> HostResult<()>;
    async fn set_mtu(&self, name: &str, mtu: u32) -> HostResult<()>;
    async fn set_mac(&self, name: &str, mac: MacAddress) -> HostResult<()>;
    async fn set_up(&self, name: &str) -> HostResult<()>;
    async fn set_down(&self, name: &str) -> HostResult<()>;
    async fn move_to_netns(&self, name: &str, netns: &Path) -> HostResult<()>;
    /// Replace semantics: repeating the call leaves exactly one address.
    async fn replace_address(&self, name: &str, address: IpNet) -> HostResult<()>;
    /// Replace semantics: repeating the call leaves exactly one route.
    async fn replace_route(&self, name: &str, route: &Route) -> HostResult<()>;
    /// Write a `net.*` sysctl in the current namespace, dotted form.
    async fn set_sysctl(&self, key: &str, value: &str) -> HostResult<()>;
}

/// Port management on the integration bridge.
#[async_trait]
pub trait Bridge: Send + Sync {
    /// Create-if-absent; re-adding an existing port succeeds.
    async fn ensure_port(&self, port: &BridgePort) -> HostResult<()>;
    /// Remove-if-present, together with its interface record.
    async fn remove_port(&self, bridge: &str, port: &str) -> HostResult<()>;
}

/// Ingress policing and egress shaping for the port tagged with an iface-id.
#[async_trait]
pub trait Qos: Send + Sync {
    async fn set_bandwidth(&self, iface_id: &str, limits: Bandwidth) -> HostResult<()>;
    /// Succeeds when there is nothing to clear.
    async fn clear_bandwidth(&self, iface_id: &str) -> HostResult<()>;
}

/// SR-IOV switchdev topology lookups.
#[async_trait]
pub trait SriovTopology: Send + Sync {
    /// Network devices backed by the PCI function.
    async fn net_devices(&self, pci: PciAddress) -> HostResult<Vec<String>>;
    async fn uplink_representor(&self, pci: PciAddress) -> HostResult<String>;
    async fn vf_index(&self, pci: PciAddress) -> HostResult<u32>;
    async fn vf_representor(&self, uplink: &str, vf_index: u32) -> HostResult<String>;
}

/// Work to run inside a network namespace, given the namespace-bound links.
pub type NetnsJob = Box<
    dyn for<'a> FnOnce(&'a dyn Netlink) -> BoxFuture<'a, Result<(), ProvisionError>> + Send,
>;

/// Box a closure as a [`NetnsJob`].
pub fn netns_job<F>(job: F) -> NetnsJob
where
    F: for<'a> FnOnce(&'a dyn Netlink) -> BoxFuture<'a, Result<(), ProvisionError>>
        + Send
        + 'static,
{
    Box::new(job)
}

/// Scoped execution inside another network namespace.
///
/// The job runs to completion pinned to a worker that is not reused for any
/// other namespace work, and the namespace handle is released on every exit
/// path before `run` returns.
#[async_trait]
pub trait NetnsRunner: Send + Sync {
    async fn run(&self, netns: &Path, job: NetnsJob) -> Result<(), ProvisionError>;
}
