use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use ipnet::IpNet;
use mac_address::MacAddress;
use serde::{Deserialize, Serialize};

use crate::error::{ProvisionError, Result};
use crate::naming::{self, LinkPair};
use crate::pci::PciAddress;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressFamily {
    IPv4,
    IPv6,
}

impl AddressFamily {
    pub fn of(ip: IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => Self::IPv4,
            IpAddr::V6(_) => Self::IPv6,
        }
    }
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IPv4 => f.write_str("IPv4"),
            Self::IPv6 => f.write_str("IPv6"),
        }
    }
}

/// Rate limits in Mbit/s. Zero means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bandwidth {
    pub ingress_mbps: u32,
    pub egress_mbps: u32,
}

/// Raw attach request as it arrives from the plugin entry point, before
/// validation. Addressing fields are already decided by IPAM.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestSpec {
    pub pod_name: String,
    pub pod_namespace: String,
    pub sandbox_id: String,
    pub netns: PathBuf,
    pub ip: String,
    pub gateway: String,
    #[serde(default)]
    pub mac: Option<String>,
    #[serde(default)]
    pub bandwidth: Bandwidth,
    #[serde(default)]
    pub hardware_devices: Vec<String>,
}

/// A validated, immutable attach request.
#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    sandbox_id: String,
    pod_name: String,
    pod_namespace: String,
    netns: PathBuf,
    address: IpNet,
    gateway: IpAddr,
    mac: Option<MacAddress>,
    bandwidth: Bandwidth,
    hardware_device: Option<PciAddress>,
}

impl ProvisionRequest {
    /// Validate `spec`. Any problem is an [`ProvisionError::InvalidRequest`],
    /// raised before the host is touched.
    ///
    /// At most one hardware device may be given; multi-NIC pods are not supported.
    pub fn new(spec: RequestSpec) -> Result<Self> {
        let invalid = |msg: String| ProvisionError::InvalidRequest(msg);

        if spec.pod_name.is_empty() || spec.pod_namespace.is_empty() {
            return Err(invalid("pod name and namespace are required".into()));
        }
        LinkPair::for_sandbox(&spec.sandbox_id)?;
        if !spec.netns.is_absolute() {
            return Err(invalid(format!(
                "netns path {} is not absolute",
                spec.netns.display()
            )));
        }

        let address: IpNet = spec
            .ip
            .parse()
            .map_err(|e| invalid(format!("ip {:?}: {e}", spec.ip)))?;
        let gateway: IpAddr = spec
            .gateway
            .parse()
            .map_err(|e| invalid(format!("gateway {:?}: {e}", spec.gateway)))?;
        if AddressFamily::of(address.addr()) != AddressFamily::of(gateway) {
            return Err(invalid(format!(
                "ip {address} and gateway {gateway} are different address families"
            )));
        }

        let mac = spec
            .mac
            .as_deref()
            .filter(|m| !m.is_empty())
            .map(|m| {
                m.parse::<MacAddress>()
                    .map_err(|e| invalid(format!("mac {m:?}: {e}")))
            })
            .transpose()?;

        let hardware_device = match spec.hardware_devices.as_slice() {
            [] => None,
            [one] => Some(
                one.parse::<PciAddress>()
                    .map_err(|e| invalid(e.to_string()))?,
            ),
            many => {
                return Err(ProvisionError::ResourceAmbiguous {
                    subject: format!("sandbox {}", spec.sandbox_id),
                    what: "hardware device",
                    found: many.len(),
                });
            }
        };

        Ok(Self {
            sandbox_id: spec.sandbox_id,
            pod_name: spec.pod_name,
            pod_namespace: spec.pod_namespace,
            netns: spec.netns,
            address,
            gateway,
            mac,
            bandwidth: spec.bandwidth,
            hardware_device,
        })
    }

    pub fn sandbox_id(&self) -> &str {
        &self.sandbox_id
    }

    pub fn pod_name(&self) -> &str {
        &self.pod_name
    }

    pub fn pod_namespace(&self) -> &str {
        &self.pod_namespace
    }

    pub fn netns(&self) -> &Path {
        &self.netns
    }

    pub fn address(&self) -> IpNet {
        self.address
    }

    pub fn gateway(&self) -> IpAddr {
        self.gateway
    }

    pub fn family(&self) -> AddressFamily {
        AddressFamily::of(self.address.addr())
    }

    pub fn mac(&self) -> Option<MacAddress> {
        self.mac
    }

    pub fn bandwidth(&self) -> Bandwidth {
        self.bandwidth
    }

    pub fn hardware_device(&self) -> Option<PciAddress> {
        self.hardware_device
    }

    pub fn iface_id(&self) -> String {
        naming::iface_id(&self.pod_name, &self.pod_namespace)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DetachRequest {
    pub pod_name: String,
    pub pod_namespace: String,
    pub sandbox_id: String,
}

impl DetachRequest {
    pub fn iface_id(&self) -> String {
        naming::iface_id(&self.pod_name, &self.pod_namespace)
    }
}

/// What attach reports back to the plugin entry point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachResponse {
    /// Assigned address with prefix, e.g. `10.0.0.5/24`.
    pub address: String,
    pub gateway: String,
    pub protocol: AddressFamily,
    pub mac: String,
}

/// An OVS port on the integration bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgePort {
    pub bridge: String,
    pub name: String,
    pub iface_id: String,
}

/// A virtual function and its switchdev representor, resolved from the VF's
/// PCI address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareBinding {
    pub pci_address: PciAddress,
    pub vf_net_device: String,
    pub uplink_representor: String,
    pub vf_index: u32,
    pub vf_representor: String,
}
