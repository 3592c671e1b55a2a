//! Interface Factory: builds the unbound host/container link pair.

use tracing::{debug, info, warn};

use crate::cleanup::{CleanupStack, Undo};
use crate::error::{HostError, ProvisionError, Result, Step};
use crate::host::{LinkKind, Netlink, SriovTopology};
use crate::naming::LinkPair;
use crate::pci::PciAddress;
use crate::teardown::delete_veth;
use crate::types::HardwareBinding;

/// How the pair is built. Chosen once per request from the presence of a
/// hardware device address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// A veth pair.
    Software,
    /// An SR-IOV VF and its switchdev representor, renamed to the pair names.
    Hardware(PciAddress),
}

impl Strategy {
    pub fn select(hardware_device: Option<PciAddress>) -> Self {
        match hardware_device {
            Some(pci) => Self::Hardware(pci),
            None => Self::Software,
        }
    }
}

pub struct InterfaceFactory<'a> {
    pub links: &'a dyn Netlink,
    pub sriov: &'a dyn SriovTopology,
    pub mtu: u32,
}

impl InterfaceFactory<'_> {
    /// Create the pair named by `pair`. Every host object created is pushed
    /// onto `cleanup` so the caller can unwind on a later failure.
    pub async fn create(
        &self,
        sandbox_id: &str,
        pair: &LinkPair,
        strategy: Strategy,
        cleanup: &mut CleanupStack,
    ) -> Result<Option<HardwareBinding>> {
        match strategy {
            Strategy::Software => {
                self.clear_stale_pair(sandbox_id, pair).await?;
                self.links
                    .add_veth(&pair.host, &pair.container, self.mtu)
                    .await
                    .map_err(ProvisionError::os(Step::CreateVeth, sandbox_id, &pair.host))?;
                cleanup.push(Undo::DeleteLink(pair.host.clone()));
                info!(sandbox_id, host = %pair.host, container = %pair.container, "veth pair created");
                Ok(None)
            }
            Strategy::Hardware(pci) => {
                let binding = resolve_binding(self.sriov, sandbox_id, pci).await?;
                self.adopt(sandbox_id, pair, &binding, cleanup).await?;
                info!(
                    sandbox_id,
                    pci = %pci,
                    vf = %binding.vf_net_device,
                    representor = %binding.vf_representor,
                    "sr-iov pair adopted"
                );
                Ok(Some(binding))
            }
        }
    }

    /// Remove a veth left behind by an attach that never finished, so a
    /// re-issued attach converges instead of failing on existing names.
    async fn clear_stale_pair(&self, sandbox_id: &str, pair: &LinkPair) -> Result<()> {
        for name in [&pair.host, &pair.container] {
            let kind = self
                .links
                .link_kind(name)
                .await
                .map_err(ProvisionError::os(Step::LookupLink, sandbox_id, name))?;
            if kind == Some(LinkKind::Veth) {
                warn!(sandbox_id, link = %name, "removing stale veth from an earlier attach");
                delete_veth(self.links, sandbox_id, name).await?;
            }
        }
        Ok(())
    }

    /// Rename the VF netdevice and its representor to the pair names and
    /// apply the MTU to both.
    async fn adopt(
        &self,
        sandbox_id: &str,
        pair: &LinkPair,
        binding: &HardwareBinding,
        cleanup: &mut CleanupStack,
    ) -> Result<()> {
        for (current, target) in [
            (&binding.vf_net_device, &pair.host),
            (&binding.vf_representor, &pair.container),
        ] {
            if current == target {
                continue;
            }
            self.links
                .rename_link(current, target)
                .await
                .map_err(ProvisionError::os(Step::RenameLink, sandbox_id, current))?;
            cleanup.push(Undo::RenameLink {
                from: target.clone(),
                to: current.clone(),
            });
        }
        for name in [&pair.host, &pair.container] {
            self.links
                .set_mtu(name, self.mtu)
                .await
                .map_err(ProvisionError::os(Step::SetMtu, sandbox_id, name))?;
        }
        Ok(())
    }
}

/// Resolve a VF's PCI address to its netdevice and representor.
///
/// Zero or several backing netdevices is a hard error; nothing is renamed.
pub async fn resolve_binding(
    sriov: &dyn SriovTopology,
    sandbox_id: &str,
    pci: PciAddress,
) -> Result<HardwareBinding> {
    let subject = pci.to_string();
    let lookup = |e: HostError| ProvisionError::os(Step::ResolveHardware, sandbox_id, &subject)(e);

    let mut devices = sriov.net_devices(pci).await.map_err(lookup)?;
    let vf_net_device = match devices.len() {
        1 => devices.pop(),
        _ => None,
    }
    .ok_or_else(|| ProvisionError::ResourceAmbiguous {
        subject: format!("pci {pci}"),
        what: "network device",
        found: devices.len(),
    })?;

    let uplink_representor = sriov.uplink_representor(pci).await.map_err(lookup)?;
    let vf_index = sriov.vf_index(pci).await.map_err(lookup)?;
    let vf_representor = sriov
        .vf_representor(&uplink_representor, vf_index)
        .await
        .map_err(lookup)?;
    debug!(sandbox_id, pci = %pci, %uplink_representor, vf_index, "resolved sr-iov topology");

    Ok(HardwareBinding {
        pci_address: pci,
        vf_net_device,
        uplink_representor,
        vf_index,
        vf_representor,
    })
}
