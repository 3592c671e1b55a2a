//! Attach/detach orchestration.

use std::fmt;
use std::sync::Arc;

use mac_address::MacAddress;
use tracing::{debug, error, info};

use crate::cleanup::{CleanupStack, Undo, UndoContext};
use crate::config::EngineConfig;
use crate::error::{ProvisionError, Result, Step};
use crate::factory::{InterfaceFactory, Strategy};
use crate::host::{Bridge, Netlink, NetnsRunner, Qos, SriovTopology};
use crate::l3::{self, ContainerNic};
use crate::locator::DeviceLocator;
use crate::naming::{self, LinkPair};
use crate::types::{AttachResponse, BridgePort, DetachRequest, ProvisionRequest, RequestSpec};
use crate::teardown::TeardownEngine;

/// Per-sandbox lifecycle, as reported in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxState {
    Unprovisioned,
    Attaching,
    Attached,
    Detaching,
}

impl fmt::Display for SandboxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unprovisioned => write!(f, "unprovisioned"),
            Self::Attaching => write!(f, "attaching"),
            Self::Attached => write!(f, "attached"),
            Self::Detaching => write!(f, "detaching"),
        }
    }
}

fn transition(sandbox_id: &str, from: SandboxState, to: SandboxState) {
    info!(sandbox_id, %from, %to, "sandbox state");
}

/// Host-side implementations the engine drives.
#[derive(Clone)]
pub struct HostBackends {
    /// Links in the host network namespace.
    pub links: Arc<dyn Netlink>,
    pub bridge: Arc<dyn Bridge>,
    pub qos: Arc<dyn Qos>,
    pub netns: Arc<dyn NetnsRunner>,
    pub sriov: Arc<dyn SriovTopology>,
}

/// The pod network provisioning engine.
///
/// Holds no per-sandbox state. Requests for different sandboxes may run
/// concurrently.
pub struct Engine {
    config: EngineConfig,
    host: HostBackends,
    locator: Option<DeviceLocator>,
}

impl Engine {
    pub fn new(config: EngineConfig, host: HostBackends) -> Result<Self> {
        config.validate()?;
        let locator = config
            .checkpoint_path
            .clone()
            .map(|path| DeviceLocator::new(path, config.hardware_resources.clone()));
        Ok(Self {
            config,
            host,
            locator,
        })
    }

    pub fn locator(&self) -> Option<&DeviceLocator> {
        self.locator.as_ref()
    }

    /// Validate a raw request. When the caller named no hardware device and
    /// a checkpoint is configured, the Device Locator fills one in.
    pub async fn prepare(&self, mut spec: RequestSpec) -> Result<ProvisionRequest> {
        LinkPair::for_sandbox(&spec.sandbox_id)?;
        if spec.hardware_devices.is_empty() {
            if let Some(locator) = &self.locator {
                spec.hardware_devices = locator.locate(&spec.sandbox_id).await?;
            }
        }
        ProvisionRequest::new(spec)
    }

    /// Provision the sandbox's network. On failure every host object created
    /// so far is removed again; if that fails too, both are reported.
    pub async fn attach(&self, req: &ProvisionRequest) -> Result<AttachResponse> {
        let id = req.sandbox_id();
        let pair = LinkPair::for_sandbox(id)?;
        let mac = req.mac().unwrap_or_else(|| naming::derive_mac(id));
        transition(id, SandboxState::Unprovisioned, SandboxState::Attaching);

        let mut cleanup = CleanupStack::new();
        let outcome = self.provision(req, &pair, mac, &mut cleanup).await;
        let err = match outcome {
            Ok(()) => {
                cleanup.commit();
                transition(id, SandboxState::Attaching, SandboxState::Attached);
                return Ok(AttachResponse {
                    address: req.address().to_string(),
                    gateway: req.gateway().to_string(),
                    protocol: req.family(),
                    mac: mac.to_string().to_lowercase(),
                });
            }
            Err(e) => e,
        };

        if cleanup.is_empty() {
            error!(sandbox_id = id, error = %err, "attach failed before touching the host");
        } else {
            error!(sandbox_id = id, error = %err, pending = cleanup.len(), "attach failed, rolling back");
        }
        let ctx = UndoContext {
            sandbox_id: id,
            links: self.host.links.as_ref(),
            bridge: self.host.bridge.as_ref(),
            qos: self.host.qos.as_ref(),
        };
        let failures = cleanup.unwind(&ctx).await;
        if failures.is_empty() {
            transition(id, SandboxState::Attaching, SandboxState::Unprovisioned);
            Err(err)
        } else {
            error!(sandbox_id = id, failures = failures.len(), "rollback incomplete; detach required");
            Err(ProvisionError::RollbackFailed {
                source: Box::new(err),
                failures,
            })
        }
    }

    async fn provision(
        &self,
        req: &ProvisionRequest,
        pair: &LinkPair,
        mac: MacAddress,
        cleanup: &mut CleanupStack,
    ) -> Result<()> {
        let id = req.sandbox_id();
        let links = self.host.links.as_ref();
        let iface_id = req.iface_id();

        let factory = InterfaceFactory {
            links,
            sriov: self.host.sriov.as_ref(),
            mtu: self.config.mtu,
        };
        let binding = factory
            .create(id, pair, Strategy::select(req.hardware_device()), cleanup)
            .await?;

        let port = BridgePort {
            bridge: self.config.bridge.clone(),
            name: pair.host.clone(),
            iface_id: iface_id.clone(),
        };
        self.host
            .bridge
            .ensure_port(&port)
            .await
            .map_err(ProvisionError::bridge(Step::BindPort, id, &pair.host))?;
        cleanup.push(Undo::RemovePort {
            bridge: port.bridge.clone(),
            port: port.name.clone(),
        });
        info!(sandbox_id = id, host_link = %pair.host, bridge = %port.bridge, %iface_id, "bridge port bound");

        links
            .set_mac(&pair.host, mac)
            .await
            .map_err(ProvisionError::os(Step::ConfigureHostNic, id, &pair.host))?;
        links
            .set_up(&pair.host)
            .await
            .map_err(ProvisionError::os(Step::ConfigureHostNic, id, &pair.host))?;

        let nic = ContainerNic {
            sandbox_id: id.to_string(),
            link: pair.container.clone(),
            ifname: self.config.container_ifname.clone(),
            address: req.address(),
            gateway: req.gateway(),
            mac,
        };
        let moved = l3::migrate_and_configure(links, self.host.netns.as_ref(), req.netns(), nic).await;
        if let Some(binding) = &binding {
            // Once the representor has left the host namespace its rename
            // can no longer be undone from here.
            if !matches!(&moved, Err(ProvisionError::Os { step: Step::MoveToNetns, .. })) {
                cleanup.retire(&Undo::RenameLink {
                    from: pair.container.clone(),
                    to: binding.vf_representor.clone(),
                });
            }
        }
        moved?;

        cleanup.push(Undo::ClearBandwidth(iface_id.clone()));
        let limits = req.bandwidth();
        self.host
            .qos
            .set_bandwidth(&iface_id, limits)
            .await
            .map_err(ProvisionError::bridge(Step::ApplyBandwidth, id, &iface_id))?;
        debug!(
            sandbox_id = id,
            ingress_mbps = limits.ingress_mbps,
            egress_mbps = limits.egress_mbps,
            "bandwidth applied"
        );
        Ok(())
    }

    /// Remove the sandbox's network. Succeeds when there is nothing to
    /// remove, so it can be repeated and can clean up after a failed attach.
    pub async fn detach(&self, req: &DetachRequest) -> Result<()> {
        let id = req.sandbox_id.as_str();
        // Nothing is stored per sandbox, so the prior state is unknown here.
        info!(sandbox_id = id, to = %SandboxState::Detaching, "detach requested");
        let teardown = TeardownEngine {
            links: self.host.links.as_ref(),
            bridge: self.host.bridge.as_ref(),
            qos: self.host.qos.as_ref(),
            bridge_name: &self.config.bridge,
        };
        teardown.detach(id, &req.iface_id()).await?;
        transition(id, SandboxState::Detaching, SandboxState::Unprovisioned);
        Ok(())
    }
}
