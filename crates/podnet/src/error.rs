use std::fmt;

/// Failure reported by a host primitive (kernel link operation, bridge tool, sysfs).
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("link {0} not found")]
    LinkNotFound(String),

    /// A shelled tool exited non-zero. `detail` is its stderr, verbatim.
    #[error("command failed: {command}\n{detail}")]
    Command { command: String, detail: String },

    #[error("sysfs: {0}")]
    Sysfs(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HostError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::LinkNotFound(_))
    }
}

/// The step of an attach or detach sequence that an error is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    CreateVeth,
    RenameLink,
    SetMtu,
    ResolveHardware,
    BindPort,
    ConfigureHostNic,
    MoveToNetns,
    EnableIpv6,
    ReplaceAddress,
    SetMac,
    SetUp,
    AddDefaultRoute,
    ApplyBandwidth,
    ClearBandwidth,
    RemovePort,
    LookupLink,
    DeleteLink,
    SetDown,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::CreateVeth => "create veth pair",
            Self::RenameLink => "rename link",
            Self::SetMtu => "set mtu",
            Self::ResolveHardware => "resolve sr-iov device",
            Self::BindPort => "add port to bridge",
            Self::ConfigureHostNic => "configure host nic",
            Self::MoveToNetns => "move link to netns",
            Self::EnableIpv6 => "enable ipv6",
            Self::ReplaceAddress => "replace address",
            Self::SetMac => "set mac address",
            Self::SetUp => "set link up",
            Self::AddDefaultRoute => "add default route",
            Self::ApplyBandwidth => "apply bandwidth",
            Self::ClearBandwidth => "clear bandwidth",
            Self::RemovePort => "remove bridge port",
            Self::LookupLink => "look up link",
            Self::DeleteLink => "delete link",
            Self::SetDown => "set link down",
        };
        f.write_str(s)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    /// Malformed request, rejected before any host mutation.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("ambiguous hardware for {subject}: expected exactly one {what}, found {found}")]
    ResourceAmbiguous {
        subject: String,
        what: &'static str,
        found: usize,
    },

    #[error("{step} failed for sandbox {sandbox_id} on {link}: {source}")]
    Os {
        step: Step,
        sandbox_id: String,
        link: String,
        #[source]
        source: HostError,
    },

    #[error("{step} failed for sandbox {sandbox_id} on port {port}: {source}")]
    Bridge {
        step: Step,
        sandbox_id: String,
        port: String,
        #[source]
        source: HostError,
    },

    #[error("checkpoint {path}: {detail}")]
    Checkpoint { path: String, detail: String },

    #[error("netns {path}: {detail}")]
    Namespace { path: String, detail: String },

    #[error("backend not available: {0}")]
    BackendNotAvailable(String),

    /// Attach failed and unwinding the already-created objects failed too.
    /// The sandbox is left for an idempotent detach to clean up.
    #[error("{source}; rollback failed: {}", join_errors(.failures))]
    RollbackFailed {
        #[source]
        source: Box<ProvisionError>,
        failures: Vec<ProvisionError>,
    },
}

fn join_errors(errors: &[ProvisionError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ProvisionError {
    /// Map a [`HostError`] from a link primitive into a step-annotated error.
    pub(crate) fn os<'a>(
        step: Step,
        sandbox_id: &'a str,
        link: &'a str,
    ) -> impl FnOnce(HostError) -> Self + 'a {
        move |source| Self::Os {
            step,
            sandbox_id: sandbox_id.to_string(),
            link: link.to_string(),
            source,
        }
    }

    /// Map a [`HostError`] from the bridge tool into a step-annotated error.
    pub(crate) fn bridge<'a>(
        step: Step,
        sandbox_id: &'a str,
        port: &'a str,
    ) -> impl FnOnce(HostError) -> Self + 'a {
        move |source| Self::Bridge {
            step,
            sandbox_id: sandbox_id.to_string(),
            port: port.to_string(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProvisionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bridge_error_keeps_tool_diagnostic() {
        let err = ProvisionError::bridge(Step::BindPort, "abcdef012345", "abcdef012345_h")(
            HostError::Command {
                command: "ovs-vsctl --may-exist add-port br-int abcdef012345_h".into(),
                detail: "ovs-vsctl: no bridge named br-int".into(),
            },
        );
        let msg = err.to_string();
        assert!(msg.contains("add port to bridge"), "got: {msg}");
        assert!(msg.contains("abcdef012345_h"), "got: {msg}");
        assert!(msg.contains("no bridge named br-int"), "got: {msg}");
    }

    #[test]
    fn rollback_error_lists_original_and_undo_failures() {
        let err = ProvisionError::RollbackFailed {
            source: Box::new(ProvisionError::InvalidRequest("boom".into())),
            failures: vec![
                ProvisionError::BackendNotAvailable("first".into()),
                ProvisionError::BackendNotAvailable("second".into()),
            ],
        };
        let msg = err.to_string();
        assert!(msg.starts_with("invalid request: boom; rollback failed:"));
        assert!(msg.contains("first; backend not available: second"));
    }
}
