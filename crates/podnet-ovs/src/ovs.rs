//! Bridge ports, QoS and mirrors through `ovs-vsctl`.
//!
//! Each invocation is one OVSDB transaction. Multi-command sequences are
//! chained with `--` so a partial configuration is never committed.

use async_trait::async_trait;
use podnet::host::{Bridge, HostResult, Qos};
use podnet::{Bandwidth, BridgePort};
use tracing::debug;

use crate::command::{Privilege, exec};

/// Name of the mirror record created by [`OvsVsctl::replace_mirror`].
pub const MIRROR_NAME: &str = "m0";

#[derive(Debug, Clone, Copy)]
pub struct OvsVsctl {
    privilege: Privilege,
}

/// Ingress policing rate in kbit/s and burst in kbit.
fn ingress_policing(mbps: u32) -> (u64, u64) {
    let rate = u64::from(mbps) * 1000;
    (rate, rate * 10 / 8)
}

/// HTB `max-rate` in bit/s.
fn egress_max_rate(mbps: u32) -> u64 {
    u64::from(mbps) * 1_000_000
}

/// Values printed by `find --data=bare --no-heading`, one per line.
fn parse_bare_column(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

impl OvsVsctl {
    pub fn new(privilege: Privilege) -> Self {
        Self { privilege }
    }

    async fn vsctl(&self, args: &[&str]) -> HostResult<String> {
        Ok(exec("ovs-vsctl", args, self.privilege).await?)
    }

    async fn run(&self, command: &[String]) -> HostResult<()> {
        let args: Vec<&str> = command.iter().map(String::as_str).collect();
        self.vsctl(&args).await?;
        Ok(())
    }

    /// One column of every `table` row tagged `external-ids:iface-id=<iface_id>`.
    async fn find_tagged(&self, table: &str, column: &str, iface_id: &str) -> HostResult<Vec<String>> {
        let columns = format!("--columns={column}");
        let condition = format!("external-ids:iface-id={iface_id}");
        let out = self
            .vsctl(&["--no-heading", "--data=bare", &columns, "find", table, &condition])
            .await?;
        Ok(parse_bare_column(&out))
    }

    /// Create-if-absent an internal port, optionally tagged with an iface-id.
    pub async fn add_internal_port(&self, bridge: &str, name: &str, iface_id: Option<&str>) -> HostResult<()> {
        let tag = iface_id.map(iface_id_tag);
        let mut args = vec![
            "--may-exist", "add-port", bridge, name, "--", "set", "interface", name, "type=internal",
        ];
        if let Some(tag) = &tag {
            args.extend_from_slice(&["--", "set", "interface", name, tag.as_str()]);
        }
        self.vsctl(&args).await?;
        Ok(())
    }

    /// Make `port` an internal port and the output of the bridge's only
    /// mirror, which selects all traffic.
    pub async fn replace_mirror(&self, bridge: &str, port: &str) -> HostResult<()> {
        let mirror_name = format!("name={MIRROR_NAME}");
        self.vsctl(&[
            "--may-exist", "add-port", bridge, port, "--",
            "set", "interface", port, "type=internal", "--",
            "clear", "bridge", bridge, "mirrors", "--",
            "--id=@mirror0", "get", "port", port, "--",
            "--id=@m", "create", "mirror", &mirror_name, "select_all=true", "output_port=@mirror0", "--",
            "add", "bridge", bridge, "mirrors", "@m",
        ])
        .await?;
        Ok(())
    }
}

/// Owned argv for one `ovs-vsctl` invocation.
fn words(args: &[&str]) -> Vec<String> {
    args.iter().map(|a| a.to_string()).collect()
}

fn iface_id_tag(iface_id: &str) -> String {
    format!("external_ids:iface-id={iface_id}")
}

fn add_port_command(port: &BridgePort) -> Vec<String> {
    words(&[
        "--may-exist", "add-port", &port.bridge, &port.name, "--",
        "set", "interface", &port.name, &iface_id_tag(&port.iface_id),
    ])
}

fn del_port_command(bridge: &str, port: &str) -> Vec<String> {
    words(&["--if-exists", "--with-iface", "del-port", bridge, port])
}

/// Invocations that bring the interfaces tagged with `iface_id` to `limits`.
///
/// `existing_qos` holds the QoS records already tagged with the iface-id.
/// Egress 0 detaches and destroys them; otherwise the first one is updated
/// or, when there is none, a `linux-htb` record is created and shared by
/// every interface.
fn bandwidth_commands(
    iface_id: &str,
    ifaces: &[String],
    existing_qos: &[String],
    limits: Bandwidth,
) -> Vec<Vec<String>> {
    let (rate, burst) = ingress_policing(limits.ingress_mbps);
    let rate = format!("ingress_policing_rate={rate}");
    let burst = format!("ingress_policing_burst={burst}");
    let mut commands: Vec<Vec<String>> = ifaces
        .iter()
        .map(|iface| words(&["set", "interface", iface, &rate, &burst]))
        .collect();

    if limits.egress_mbps == 0 {
        commands.extend(
            ifaces
                .iter()
                .map(|iface| words(&["--if-exists", "clear", "port", iface, "qos"])),
        );
        commands.extend(
            existing_qos
                .iter()
                .map(|uuid| words(&["--if-exists", "destroy", "qos", uuid])),
        );
        return commands;
    }

    let max_rate = format!("other-config:max-rate={}", egress_max_rate(limits.egress_mbps));
    if let Some(uuid) = existing_qos.first() {
        commands.push(words(&["set", "qos", uuid, &max_rate]));
        let qos = format!("qos={uuid}");
        commands.extend(ifaces.iter().map(|iface| words(&["set", "port", iface, &qos])));
    } else if !ifaces.is_empty() {
        // One transaction: every port references the record it creates.
        let mut create = Vec::new();
        for iface in ifaces {
            create.extend(words(&["set", "port", iface, "qos=@qos", "--"]));
        }
        create.extend(words(&[
            "--id=@qos", "create", "qos", "type=linux-htb", &max_rate,
            &format!("external-ids:iface-id={iface_id}"),
        ]));
        commands.push(create);
    }
    commands
}

#[async_trait]
impl Bridge for OvsVsctl {
    async fn ensure_port(&self, port: &BridgePort) -> HostResult<()> {
        self.run(&add_port_command(port)).await
    }

    async fn remove_port(&self, bridge: &str, port: &str) -> HostResult<()> {
        self.run(&del_port_command(bridge, port)).await
    }
}

#[async_trait]
impl Qos for OvsVsctl {
    async fn set_bandwidth(&self, iface_id: &str, limits: Bandwidth) -> HostResult<()> {
        let ifaces = self.find_tagged("interface", "name", iface_id).await?;
        let existing_qos = self.find_tagged("qos", "_uuid", iface_id).await?;
        for command in bandwidth_commands(iface_id, &ifaces, &existing_qos, limits) {
            self.run(&command).await?;
        }
        debug!(iface_id, ?ifaces, ?limits, "qos set");
        Ok(())
    }

    async fn clear_bandwidth(&self, iface_id: &str) -> HostResult<()> {
        self.set_bandwidth(iface_id, Bandwidth::default()).await
    }
}
