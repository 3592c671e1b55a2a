//! Link primitives on top of iproute2.
//!
//! Every call runs `ip` as a child process, which inherits the network
//! namespace of the calling thread. Inside a namespace worker the same
//! driver therefore acts on the pod's namespace.

use std::path::Path;

use async_trait::async_trait;
use ipnet::IpNet;
use mac_address::MacAddress;
use podnet::HostError;
use podnet::host::{HostResult, LinkKind, Netlink, Route};
use serde::Deserialize;

use crate::command::{CommandError, Privilege, exec};

/// iproute2 stderr fragments meaning "no such link".
const NOT_FOUND_MARKERS: &[&str] = &["Cannot find device", "does not exist"];

#[derive(Debug, Clone, Copy)]
pub struct IpLinks {
    privilege: Privilege,
}

impl IpLinks {
    pub fn new(privilege: Privilege) -> Self {
        Self { privilege }
    }

    async fn ip(&self, args: &[&str]) -> Result<String, CommandError> {
        exec("ip", args, self.privilege).await
    }

    /// Run an `ip` command against `link`, mapping "no such device" to
    /// [`HostError::LinkNotFound`].
    async fn ip_link(&self, link: &str, args: &[&str]) -> HostResult<String> {
        self.ip(args).await.map_err(|e| not_found_or(link, e))
    }
}

fn not_found_or(link: &str, e: CommandError) -> HostError {
    if NOT_FOUND_MARKERS.iter().any(|m| e.detail.contains(m)) {
        HostError::LinkNotFound(link.to_string())
    } else {
        e.into()
    }
}

fn veth_args<'a>(name: &'a str, peer: &'a str, mtu: &'a str) -> [&'a str; 13] {
    [
        "link", "add", "name", name, "mtu", mtu, "type", "veth", "peer", "name", peer, "mtu", mtu,
    ]
}

fn address_replace_args<'a>(name: &'a str, address: &'a str) -> [&'a str; 5] {
    ["addr", "replace", address, "dev", name]
}

fn route_replace_args<'a>(name: &'a str, destination: &'a str, gateway: &'a str, ipv6: bool) -> Vec<&'a str> {
    let mut args = Vec::with_capacity(10);
    if ipv6 {
        args.push("-6");
    }
    args.extend_from_slice(&[
        "route", "replace", destination, "via", gateway, "dev", name, "scope", "global",
    ]);
    args
}

#[derive(Debug, Deserialize)]
struct LinkDetail {
    #[serde(default)]
    linkinfo: Option<LinkInfo>,
}

#[derive(Debug, Deserialize)]
struct LinkInfo {
    #[serde(default)]
    info_kind: Option<String>,
}

/// Classify the output of `ip -j -d link show dev <name>`.
fn parse_link_kind(json: &str) -> serde_json::Result<Option<LinkKind>> {
    let links: Vec<LinkDetail> = serde_json::from_str(json)?;
    Ok(links.first().map(|link| {
        let kind = link
            .linkinfo
            .as_ref()
            .and_then(|info| info.info_kind.as_deref());
        match kind {
            Some("veth") => LinkKind::Veth,
            _ => LinkKind::Device,
        }
    }))
}

#[async_trait]
impl Netlink for IpLinks {
    async fn add_veth(&self, name: &str, peer: &str, mtu: u32) -> HostResult<()> {
        let mtu = mtu.to_string();
        self.ip(&veth_args(name, peer, &mtu)).await?;
        Ok(())
    }

    async fn delete_link(&self, name: &str) -> HostResult<()> {
        self.ip_link(name, &["link", "delete", "dev", name]).await?;
        Ok(())
    }

    async fn link_kind(&self, name: &str) -> HostResult<Option<LinkKind>> {
        let json = match self.ip_link(name, &["-j", "-d", "link", "show", "dev", name]).await {
            Ok(json) => json,
            Err(HostError::LinkNotFound(_)) => return Ok(None),
            Err(e) => return Err(e),
        };
        parse_link_kind(&json).map_err(|e| HostError::Command {
            command: format!("ip -j -d link show dev {name}"),
            detail: format!("unparseable output: {e}"),
        })
    }

    async fn rename_link(&self, name: &str, new_name: &str) -> HostResult<()> {
        self.set_down(name).await?;
        self.ip_link(name, &["link", "set", "dev", name, "name", new_name])
            .await?;
        Ok(())
    }

    async fn set_mtu(&self, name: &str, mtu: u32) -> HostResult<()> {
        let mtu = mtu.to_string();
        self.ip_link(name, &["link", "set", "dev", name, "mtu", &mtu])
            .await?;
        Ok(())
    }

    async fn set_mac(&self, name: &str, mac: MacAddress) -> HostResult<()> {
        let mac = mac.to_string().to_lowercase();
        self.ip_link(name, &["link", "set", "dev", name, "address", &mac])
            .await?;
        Ok(())
    }

    async fn set_up(&self, name: &str) -> HostResult<()> {
        self.ip_link(name, &["link", "set", "dev", name, "up"]).await?;
        Ok(())
    }

    async fn set_down(&self, name: &str) -> HostResult<()> {
        self.ip_link(name, &["link", "set", "dev", name, "down"]).await?;
        Ok(())
    }

    async fn move_to_netns(&self, name: &str, netns: &Path) -> HostResult<()> {
        let netns = netns.to_string_lossy();
        self.ip_link(name, &["link", "set", "dev", name, "netns", netns.as_ref()])
            .await?;
        Ok(())
    }

    async fn replace_address(&self, name: &str, address: IpNet) -> HostResult<()> {
        let address = address.to_string();
        self.ip_link(name, &address_replace_args(name, &address)).await?;
        Ok(())
    }

    async fn replace_route(&self, name: &str, route: &Route) -> HostResult<()> {
        let destination = route.destination.to_string();
        let gateway = route.gateway.to_string();
        let ipv6 = route.destination.addr().is_ipv6();
        self.ip_link(name, &route_replace_args(name, &destination, &gateway, ipv6))
            .await?;
        Ok(())
    }

    async fn set_sysctl(&self, key: &str, value: &str) -> HostResult<()> {
        let assignment = format!("{key}={value}");
        exec("sysctl", &["-w", &assignment], self.privilege).await?;
        Ok(())
    }
}
