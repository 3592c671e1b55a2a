//! SR-IOV switchdev topology from sysfs.
//!
//! ```text
//! <root>/bus/pci/devices/<vf>/net/<vf netdev>
//! <root>/bus/pci/devices/<vf>/physfn            -> ../<pf>
//! <root>/bus/pci/devices/<pf>/virtfn<N>         -> ../<vf>
//! <root>/bus/pci/devices/<pf>/net/<uplink>/phys_port_name   "p0"
//! <root>/class/net/<rep>/phys_switch_id         same as the uplink
//! <root>/class/net/<rep>/phys_port_name         "pf0vf<N>" or "<N>"
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use podnet::host::{HostResult, SriovTopology};
use podnet::{HostError, PciAddress};
use tracing::trace;

pub const DEFAULT_SYSFS_ROOT: &str = "/sys";

#[derive(Debug, Clone)]
pub struct SysfsTopology {
    root: PathBuf,
}

impl SysfsTopology {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn pci_device(&self, pci: PciAddress) -> PathBuf {
        self.root.join("bus/pci/devices").join(pci.to_string())
    }

    fn class_net(&self) -> PathBuf {
        self.root.join("class/net")
    }
}

/// Entry names of a directory, sorted. A missing directory is empty.
async fn list_dir(dir: &Path) -> HostResult<Vec<String>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// Trimmed contents of a sysfs attribute; `None` if it is absent or the
/// driver refuses to report it.
async fn read_attr(path: &Path) -> Option<String> {
    tokio::fs::read_to_string(path)
        .await
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Uplinks report `p<N>`; legacy drivers report nothing at all.
fn is_uplink_port_name(port_name: Option<&str>) -> bool {
    match port_name {
        None => true,
        Some(name) => name
            .strip_prefix('p')
            .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit())),
    }
}

/// Whether `port_name` names the representor of VF `vf_index`.
fn is_vf_port_name(port_name: &str, vf_index: u32) -> bool {
    let index = match port_name
        .strip_prefix("pf")
        .and_then(|rest| rest.split_once("vf"))
    {
        Some((pf, vf)) if !pf.is_empty() && pf.bytes().all(|b| b.is_ascii_digit()) => vf,
        Some(_) => return false,
        None => port_name,
    };
    index.parse::<u32>().is_ok_and(|i| i == vf_index)
}

#[async_trait]
impl SriovTopology for SysfsTopology {
    async fn net_devices(&self, pci: PciAddress) -> HostResult<Vec<String>> {
        let device = self.pci_device(pci);
        if !tokio::fs::try_exists(&device).await? {
            return Err(HostError::Sysfs(format!("no pci device {pci}")));
        }
        let devices = list_dir(&device.join("net")).await?;
        trace!(pci = %pci, ?devices, "vf netdevices");
        Ok(devices)
    }

    async fn uplink_representor(&self, pci: PciAddress) -> HostResult<String> {
        let pf_net = self.pci_device(pci).join("physfn/net");
        for name in list_dir(&pf_net).await? {
            let port_name = read_attr(&pf_net.join(&name).join("phys_port_name")).await;
            if is_uplink_port_name(port_name.as_deref()) {
                return Ok(name);
            }
        }
        Err(HostError::Sysfs(format!(
            "no uplink representor for {pci} under {}",
            pf_net.display()
        )))
    }

    async fn vf_index(&self, pci: PciAddress) -> HostResult<u32> {
        let pf = self.pci_device(pci).join("physfn");
        let wanted = pci.to_string();
        for name in list_dir(&pf).await? {
            let Some(index) = name.strip_prefix("virtfn") else {
                continue;
            };
            let Ok(index) = index.parse::<u32>() else {
                continue;
            };
            let target = tokio::fs::read_link(pf.join(&name)).await?;
            if target.file_name().and_then(|f| f.to_str()) == Some(wanted.as_str()) {
                return Ok(index);
            }
        }
        Err(HostError::Sysfs(format!("{pci} is not a virtual function")))
    }

    async fn vf_representor(&self, uplink: &str, vf_index: u32) -> HostResult<String> {
        let class_net = self.class_net();
        let switch_id = read_attr(&class_net.join(uplink).join("phys_switch_id"))
            .await
            .ok_or_else(|| {
                HostError::Sysfs(format!("{uplink} has no phys_switch_id; not in switchdev mode"))
            })?;

        for name in list_dir(&class_net).await? {
            if name == uplink {
                continue;
            }
            let dev = class_net.join(&name);
            if read_attr(&dev.join("phys_switch_id")).await.as_deref() != Some(switch_id.as_str()) {
                continue;
            }
            if let Some(port_name) = read_attr(&dev.join("phys_port_name")).await
                && is_vf_port_name(&port_name, vf_index)
            {
                return Ok(name);
            }
        }
        Err(HostError::Sysfs(format!(
            "no representor for vf {vf_index} on {uplink}"
        )))
    }
}
