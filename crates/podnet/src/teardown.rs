//! Teardown Engine: idempotent detach.
//!
//! Nothing is read from stored state. Link names are recomputed from the
//! sandbox ID, and every step treats "already gone" as done.

use tracing::{debug, info, warn};

use crate::error::{ProvisionError, Result, Step};
use crate::host::{Bridge, LinkKind, Netlink, Qos};
use crate::naming::LinkPair;

pub struct TeardownEngine<'a> {
    pub links: &'a dyn Netlink,
    pub bridge: &'a dyn Bridge,
    pub qos: &'a dyn Qos,
    pub bridge_name: &'a str,
}

impl TeardownEngine<'_> {
    /// Remove the bridge port, clear bandwidth, and dispose of whatever is
    /// left of the link pair in the host namespace.
    ///
    /// Every step runs even if an earlier one fails. The first failure is
    /// returned; the rest are logged.
    pub async fn detach(&self, sandbox_id: &str, iface_id: &str) -> Result<()> {
        let pair = LinkPair::for_sandbox(sandbox_id)?;
        let mut errors = Vec::new();

        if let Err(e) = self
            .bridge
            .remove_port(self.bridge_name, &pair.host)
            .await
            .map_err(ProvisionError::bridge(Step::RemovePort, sandbox_id, &pair.host))
        {
            errors.push(e);
        }

        if let Err(e) = self
            .qos
            .clear_bandwidth(iface_id)
            .await
            .map_err(ProvisionError::bridge(Step::ClearBandwidth, sandbox_id, iface_id))
        {
            errors.push(e);
        }

        // The container name only exists on the host side when an attach
        // stopped before the namespace move.
        for name in [&pair.host, &pair.container] {
            if let Err(e) = self.dispose_link(sandbox_id, name).await {
                errors.push(e);
            }
        }

        let mut errors = errors.into_iter();
        match errors.next() {
            None => {
                info!(sandbox_id, host = %pair.host, "sandbox network removed");
                Ok(())
            }
            Some(first) => {
                for other in errors {
                    warn!(sandbox_id, error = %other, "additional detach failure");
                }
                Err(first)
            }
        }
    }

    async fn dispose_link(&self, sandbox_id: &str, name: &str) -> Result<()> {
        let kind = self
            .links
            .link_kind(name)
            .await
            .map_err(ProvisionError::os(Step::LookupLink, sandbox_id, name))?;

        match kind {
            None => {
                debug!(sandbox_id, link = name, "link already absent");
                Ok(())
            }
            Some(LinkKind::Veth) => delete_veth(self.links, sandbox_id, name).await,
            // VFs and representors cannot be deleted; park them down so the
            // next attach can adopt them again.
            Some(LinkKind::Device) => {
                self.links
                    .set_down(name)
                    .await
                    .map_err(ProvisionError::os(Step::SetDown, sandbox_id, name))?;
                debug!(sandbox_id, link = name, "hardware link set down");
                Ok(())
            }
        }
    }
}

/// Delete a veth by either end. The peer goes with it, wherever it lives.
pub(crate) async fn delete_veth(links: &dyn Netlink, sandbox_id: &str, name: &str) -> Result<()> {
    match links.delete_link(name).await {
        Err(e) if !e.is_not_found() => Err(ProvisionError::os(Step::DeleteLink, sandbox_id, name)(e)),
        _ => {
            debug!(sandbox_id, link = name, "veth deleted");
            Ok(())
        }
    }
}
