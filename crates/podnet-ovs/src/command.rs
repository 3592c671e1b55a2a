use std::process::Output;

use podnet::HostError;
use tokio::process::Command;
use tracing::trace;

/// Error from a failed command.
#[derive(Debug, thiserror::Error)]
#[error("command failed: {command}\n{detail}")]
pub struct CommandError {
    pub command: String,
    /// Trimmed stderr, or the spawn error.
    pub detail: String,
}

impl From<CommandError> for HostError {
    fn from(e: CommandError) -> Self {
        HostError::Command {
            command: e.command,
            detail: e.detail,
        }
    }
}

/// How a command should be executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    /// Prefix with `sudo -n`.
    Sudo,
    /// Run as the current user (the daemon is expected to hold `CAP_NET_ADMIN`).
    User,
}

impl Privilege {
    pub fn from_sudo(sudo: bool) -> Self {
        if sudo { Self::Sudo } else { Self::User }
    }
}

/// A host tool invocation, as run and as shown in logs and errors.
struct Invocation<'a> {
    program: &'a str,
    args: &'a [&'a str],
    privilege: Privilege,
}

impl Invocation<'_> {
    fn argv(&self) -> Vec<&str> {
        let mut argv = Vec::with_capacity(self.args.len() + 3);
        if self.privilege == Privilege::Sudo {
            argv.extend_from_slice(&["sudo", "-n"]);
        }
        argv.push(self.program);
        argv.extend_from_slice(self.args);
        argv
    }

    async fn output(&self) -> Result<Output, CommandError> {
        let argv = self.argv();
        let shown = argv.join(" ");
        trace!(command = %shown, "exec");
        let Some((program, args)) = argv.split_first() else {
            return Err(CommandError {
                command: shown,
                detail: "empty command line".to_string(),
            });
        };
        Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| CommandError {
                command: shown,
                detail: e.to_string(),
            })
    }
}

/// Execute a command and return its trimmed stdout.
///
/// The child inherits the calling thread's network namespace, so this is
/// also how work inside a pod namespace reaches the host tools.
pub async fn exec(program: &str, args: &[&str], privilege: Privilege) -> Result<String, CommandError> {
    let invocation = Invocation { program, args, privilege };
    let output = invocation.output().await?;
    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).trim().to_string());
    }

    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    Err(CommandError {
        command: invocation.argv().join(" "),
        detail: if stderr.is_empty() {
            output.status.to_string()
        } else {
            stderr
        },
    })
}

/// Execute a command and return stdout and stderr together, whatever the exit
/// status. Only a spawn failure is an error.
pub async fn exec_combined(
    program: &str,
    args: &[&str],
    privilege: Privilege,
) -> Result<String, CommandError> {
    let output = Invocation { program, args, privilege }.output().await?;
    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok(combined.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn display(program: &str, args: &[&str], privilege: Privilege) -> String {
        Invocation { program, args, privilege }.argv().join(" ")
    }

    #[test]
    fn display_user() {
        let shown = display("ip", &["link", "set", "dev", "x_h", "up"], Privilege::User);
        assert_eq!(shown, "ip link set dev x_h up");
    }

    #[test]
    fn display_sudo() {
        let shown = display("ovs-vsctl", &["show"], Privilege::Sudo);
        assert_eq!(shown, "sudo -n ovs-vsctl show");
    }

    #[tokio::test]
    async fn exec_returns_trimmed_stdout() {
        let output = exec("echo", &["hello"], Privilege::User).await.unwrap();
        assert_eq!(output, "hello");
    }

    #[tokio::test]
    async fn exec_error_contains_stderr() {
        let err = exec("sh", &["-c", "echo 'no bridge named br-int' >&2; exit 1"], Privilege::User)
            .await
            .unwrap_err();
        assert_eq!(err.detail, "no bridge named br-int");
        assert!(err.command.starts_with("sh -c"), "command was: {}", err.command);
    }

    #[tokio::test]
    async fn exec_error_without_stderr_reports_status() {
        let err = exec("false", &[], Privilege::User).await.unwrap_err();
        assert!(err.detail.contains("exit status"), "detail was: {}", err.detail);
    }

    #[tokio::test]
    async fn exec_missing_program_is_error() {
        let err = exec("podnet-no-such-tool", &[], Privilege::User)
            .await
            .unwrap_err();
        assert!(err.command.contains("podnet-no-such-tool"));
    }

    #[tokio::test]
    async fn exec_combined_keeps_output_of_failures() {
        let out = exec_combined("sh", &["-c", "echo out; echo err >&2; exit 1"], Privilege::User)
            .await
            .unwrap();
        assert_eq!(out, "out\nerr");
    }

    #[test]
    fn command_error_converts_to_host_error() {
        let err: HostError = CommandError {
            command: "ip link".into(),
            detail: "boom".into(),
        }
        .into();
        assert!(matches!(err, HostError::Command { ref detail, .. } if detail == "boom"));
    }
}
