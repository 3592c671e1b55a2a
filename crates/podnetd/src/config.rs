use std::path::{Path, PathBuf};

use podnet::EngineConfig;
use podnet_ovs::{DEFAULT_SYSFS_ROOT, Privilege};
use serde::{Deserialize, Serialize};

use crate::error::{DaemonError, DaemonResult};

#[derive(Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub network: EngineConfig,
    pub host: HostConfig,
}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Run host tools through `sudo -n` instead of relying on the daemon's
    /// own capabilities.
    pub sudo: bool,
    pub sysfs_root: PathBuf,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            sudo: false,
            sysfs_root: PathBuf::from(DEFAULT_SYSFS_ROOT),
        }
    }
}

impl HostConfig {
    pub fn privilege(&self) -> Privilege {
        Privilege::from_sudo(self.sudo)
    }
}

/// Load and validate the daemon config. No path means all defaults.
pub async fn load(path: Option<&Path>) -> DaemonResult<DaemonConfig> {
    let config = match path {
        None => DaemonConfig::default(),
        Some(path) => {
            let content = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| DaemonError::Config(format!("read {}: {e}", path.display())))?;
            serde_yaml_ng::from_str(&content)
                .map_err(|e| DaemonError::Config(format!("parse {}: {e}", path.display())))?
        }
    };
    config
        .network
        .validate()
        .map_err(|e| DaemonError::Config(e.to_string()))?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write_config(yaml: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("podnetd.yaml");
        tokio::fs::write(&path, yaml).await.unwrap();
        (dir, path)
    }

    #[tokio::test]
    async fn no_file_means_defaults() {
        let config = load(None).await.unwrap();
        assert_eq!(config, DaemonConfig::default());
        assert_eq!(config.network.bridge, "br-int");
        assert_eq!(config.network.mtu, 1400);
        assert_eq!(config.host.sysfs_root, PathBuf::from("/sys"));
        assert_eq!(config.host.privilege(), Privilege::User);
    }

    #[tokio::test]
    async fn load_full_config() {
        let (_dir, path) = write_config(
            r#"
network:
  bridge: br-pods
  mtu: 9000
  container_ifname: eth0
  checkpoint_path: null
  hardware_resources:
    - example.com/sriov_switchdev
host:
  sudo: true
  sysfs_root: /host/sys
"#,
        )
        .await;

        let config = load(Some(&path)).await.unwrap();
        assert_eq!(config.network.bridge, "br-pods");
        assert_eq!(config.network.mtu, 9000);
        assert!(config.network.checkpoint_path.is_none());
        assert_eq!(config.network.hardware_resources, vec!["example.com/sriov_switchdev"]);
        assert!(config.host.sudo);
        assert_eq!(config.host.privilege(), Privilege::Sudo);
        assert_eq!(config.host.sysfs_root, PathBuf::from("/host/sys"));
    }

    #[tokio::test]
    async fn partial_config_keeps_defaults() {
        let (_dir, path) = write_config("network:\n  mtu: 1450\n").await;
        let config = load(Some(&path)).await.unwrap();
        assert_eq!(config.network.mtu, 1450);
        assert_eq!(config.network.bridge, "br-int");
        assert_eq!(
            config.network.checkpoint_path.as_deref(),
            Some(Path::new(podnet::DEFAULT_CHECKPOINT_PATH))
        );
        assert_eq!(config.host, HostConfig::default());
    }

    #[tokio::test]
    async fn invalid_values_are_rejected() {
        let (_dir, path) = write_config("network:\n  mtu: 20\n").await;
        let err = load(Some(&path)).await.unwrap_err();
        assert!(err.to_string().contains("mtu"), "got: {err}");

        let (_dir, path) = write_config("network:\n  container_ifname: averyveryverylongname\n").await;
        assert!(load(Some(&path)).await.is_err());
    }

    #[tokio::test]
    async fn missing_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(Some(&dir.path().join("absent.yaml"))).await.unwrap_err();
        assert!(matches!(err, DaemonError::Config(_)), "got: {err}");
    }

    #[tokio::test]
    async fn malformed_yaml_is_config_error() {
        let (_dir, path) = write_config("network: [not, a, map]\n").await;
        let err = load(Some(&path)).await.unwrap_err();
        assert!(err.to_string().contains("parse"), "got: {err}");
    }
}
