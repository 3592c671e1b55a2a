use std::path::Path;

use podnet::ProvisionError;

use crate::command::{Privilege, exec};

const REQUIRED_COMMANDS: &[&str] = &["ip", "ovs-vsctl", "ping", "sysctl"];

/// Verify the host can run the backend.
///
/// Checks the host tools, the sysfs mount, and sudo access when configured.
/// Collects all failures and returns them in a single `BackendNotAvailable` error.
pub async fn check_prerequisites(sysfs_root: &Path, privilege: Privilege) -> Result<(), ProvisionError> {
    let mut errors = Vec::new();

    check_required_commands(&mut errors);
    check_sysfs(sysfs_root, &mut errors);
    if privilege == Privilege::Sudo {
        check_sudo(&mut errors).await;
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ProvisionError::BackendNotAvailable(errors.join("; ")))
    }
}

fn check_required_commands(errors: &mut Vec<String>) {
    for cmd in REQUIRED_COMMANDS {
        if which::which(cmd).is_err() {
            errors.push(format!("required command not found: {cmd}"));
        }
    }
}

fn check_sysfs(root: &Path, errors: &mut Vec<String>) {
    if !root.join("class/net").is_dir() {
        errors.push(format!("sysfs not mounted at {}", root.display()));
    }
}

async fn check_sudo(errors: &mut Vec<String>) {
    if exec("sudo", &["-n", "true"], Privilege::User).await.is_err() {
        errors.push(
            "sudo configured but not usable without a password; \
             run as root or configure sudoers"
                .to_string(),
        );
    }
}
