//! Pod network provisioning for an OVS-based Kubernetes CNI.
//!
//! The engine wires a sandbox's network namespace to the integration bridge:
//! it builds a host/container link pair (veth or SR-IOV VF), binds the host
//! side to the bridge, configures the container side inside its namespace,
//! and applies bandwidth limits. Detach undoes all of it and is idempotent.
//!
//! All host access goes through the traits in [`host`]; the Linux/OVS
//! implementation lives in the `podnet-ovs` crate.

mod cleanup;
mod config;
mod engine;
mod error;
mod factory;
pub mod host;
mod l3;
mod locator;
mod naming;
mod pci;
mod teardown;
mod types;

pub use cleanup::{CleanupStack, Undo, UndoContext};
pub use config::{
    DEFAULT_BRIDGE, DEFAULT_CHECKPOINT_PATH, DEFAULT_CONTAINER_IFNAME, DEFAULT_HARDWARE_RESOURCES,
    DEFAULT_MTU, EngineConfig,
};
pub use engine::{Engine, HostBackends, SandboxState};
pub use error::{HostError, ProvisionError, Result, Step};
pub use factory::{InterfaceFactory, Strategy, resolve_binding};
pub use l3::{ContainerNic, DISABLE_IPV6_SYSCTL, configure_container_nic, default_route, migrate_and_configure};
pub use locator::{Checkpoint, DeviceIds, DeviceLocator, PodDeviceEntry};
pub use naming::{IFNAME_MAX_LEN, LinkPair, SANDBOX_PREFIX_LEN, derive_mac, iface_id};
pub use pci::{PciAddress, PciAddressParseError};
pub use teardown::TeardownEngine;
pub use types::{
    AddressFamily, AttachResponse, Bandwidth, BridgePort, DetachRequest, HardwareBinding,
    ProvisionRequest, RequestSpec,
};
