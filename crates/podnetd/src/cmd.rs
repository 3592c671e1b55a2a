use std::net::IpAddr;
use std::path::PathBuf;

use clap::Args;
use ipnet::IpNet;
use mac_address::MacAddress;
use podnet::{Bandwidth, DetachRequest, Engine, RequestSpec};
use podnet_ovs::{IpLinks, NodeNic, OvsVsctl};
use serde::Serialize;
use tracing::info;

use crate::config::DaemonConfig;
use crate::error::{DaemonError, DaemonResult};

#[derive(Args)]
pub struct AttachArgs {
    /// Pod name
    #[arg(long)]
    pod: String,
    /// Pod namespace
    #[arg(long)]
    namespace: String,
    /// Container sandbox ID
    #[arg(long)]
    sandbox_id: String,
    /// Path of the sandbox network namespace
    #[arg(long)]
    netns: PathBuf,
    /// Address with prefix, e.g. 10.16.0.5/16
    #[arg(long)]
    ip: String,
    #[arg(long)]
    gateway: String,
    /// MAC address; derived from the sandbox ID when omitted
    #[arg(long)]
    mac: Option<String>,
    /// Ingress limit in Mbit/s (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    ingress: u32,
    /// Egress limit in Mbit/s (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    egress: u32,
    /// SR-IOV VF PCI address; looked up in the kubelet checkpoint when omitted
    #[arg(long = "device")]
    devices: Vec<String>,
}

impl From<AttachArgs> for RequestSpec {
    fn from(args: AttachArgs) -> Self {
        RequestSpec {
            pod_name: args.pod,
            pod_namespace: args.namespace,
            sandbox_id: args.sandbox_id,
            netns: args.netns,
            ip: args.ip,
            gateway: args.gateway,
            mac: args.mac,
            bandwidth: Bandwidth {
                ingress_mbps: args.ingress,
                egress_mbps: args.egress,
            },
            hardware_devices: args.devices,
        }
    }
}

#[derive(Args)]
pub struct DetachArgs {
    #[arg(long)]
    pod: String,
    #[arg(long)]
    namespace: String,
    #[arg(long)]
    sandbox_id: String,
}

#[derive(Args)]
pub struct LocateArgs {
    #[arg(long)]
    sandbox_id: String,
}

#[derive(Args)]
pub struct NodeNicArgs {
    /// Logical switch port of this node
    #[arg(long)]
    port_name: String,
    #[arg(long)]
    ip: IpNet,
    #[arg(long)]
    mac: MacAddress,
    #[arg(long)]
    gateway: IpAddr,
}

fn build_engine(config: &DaemonConfig) -> DaemonResult<Engine> {
    let backends = podnet_ovs::host_backends(config.host.privilege(), config.host.sysfs_root.clone());
    Ok(Engine::new(config.network.clone(), backends)?)
}

fn print_json<T: Serialize>(value: &T) -> DaemonResult<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

pub async fn run_attach(config: &DaemonConfig, args: AttachArgs) -> DaemonResult<()> {
    let engine = build_engine(config)?;
    let request = engine.prepare(args.into()).await?;
    let response = engine.attach(&request).await?;
    print_json(&response)
}

pub async fn run_detach(config: &DaemonConfig, args: DetachArgs) -> DaemonResult<()> {
    let engine = build_engine(config)?;
    engine
        .detach(&DetachRequest {
            pod_name: args.pod,
            pod_namespace: args.namespace,
            sandbox_id: args.sandbox_id,
        })
        .await?;
    Ok(())
}

pub async fn run_locate(config: &DaemonConfig, args: LocateArgs) -> DaemonResult<()> {
    let engine = build_engine(config)?;
    let locator = engine
        .locator()
        .ok_or_else(|| DaemonError::Config("network.checkpoint_path is not set".into()))?;
    let devices = locator.locate(&args.sandbox_id).await?;
    print_json(&devices)
}

pub async fn run_node_nic(config: &DaemonConfig, args: NodeNicArgs) -> DaemonResult<()> {
    let privilege = config.host.privilege();
    let nic = NodeNic {
        port_name: args.port_name,
        address: args.ip,
        mac: args.mac,
        gateway: args.gateway,
        mtu: config.network.mtu,
    };
    podnet_ovs::configure_node_nic(
        &OvsVsctl::new(privilege),
        &IpLinks::new(privilege),
        &config.network.bridge,
        &nic,
        privilege,
    )
    .await?;
    Ok(())
}

pub async fn run_mirror(config: &DaemonConfig) -> DaemonResult<()> {
    let privilege = config.host.privilege();
    podnet_ovs::configure_mirror(
        &OvsVsctl::new(privilege),
        &IpLinks::new(privilege),
        &config.network.bridge,
        config.network.mtu,
    )
    .await?;
    Ok(())
}

pub async fn run_check(config: &DaemonConfig) -> DaemonResult<()> {
    podnet_ovs::check_prerequisites(&config.host.sysfs_root, config.host.privilege()).await?;
    info!("host prerequisites satisfied");
    Ok(())
}
