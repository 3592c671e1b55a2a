//! Device Locator: which SR-IOV device, if any, the kubelet bound to a sandbox.
//!
//! The kubelet device-plugin checkpoint is read as a snapshot on every lookup.
//! There is no locking contract with the kubelet, so a stale snapshot just
//! yields an empty result.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{ProvisionError, Result};

#[derive(Debug, Deserialize)]
struct CheckpointFile {
    #[serde(rename = "Data")]
    data: CheckpointData,
}

#[derive(Debug, Default, Deserialize)]
struct CheckpointData {
    #[serde(rename = "PodDeviceEntries", default)]
    pod_device_entries: Option<Vec<PodDeviceEntry>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PodDeviceEntry {
    #[serde(rename = "PodUID")]
    pub pod_uid: String,
    #[serde(rename = "ResourceName")]
    pub resource_name: String,
    #[serde(rename = "DeviceIDs")]
    pub device_ids: DeviceIds,
}

/// Older kubelets write a flat list; newer ones group device IDs by NUMA node.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum DeviceIds {
    Flat(Vec<String>),
    ByNumaNode(BTreeMap<String, Vec<String>>),
}

impl DeviceIds {
    pub fn iter(&self) -> Box<dyn Iterator<Item = &str> + '_> {
        match self {
            Self::Flat(ids) => Box::new(ids.iter().map(String::as_str)),
            Self::ByNumaNode(nodes) => {
                Box::new(nodes.values().flatten().map(String::as_str))
            }
        }
    }
}

/// Parsed device-plugin checkpoint.
#[derive(Debug, Clone, Default)]
pub struct Checkpoint {
    pub entries: Vec<PodDeviceEntry>,
}

impl Checkpoint {
    pub fn parse(raw: &[u8]) -> serde_json::Result<Self> {
        let file: CheckpointFile = serde_json::from_slice(raw)?;
        Ok(Self {
            entries: file.data.pod_device_entries.unwrap_or_default(),
        })
    }

    pub async fn read(path: &Path) -> Result<Self> {
        let checkpoint_err = |detail: String| ProvisionError::Checkpoint {
            path: path.display().to_string(),
            detail,
        };
        let raw = tokio::fs::read(path)
            .await
            .map_err(|e| checkpoint_err(format!("read: {e}")))?;
        Self::parse(&raw).map_err(|e| checkpoint_err(format!("parse: {e}")))
    }

    /// Device IDs owned by `sandbox_id` under an allow-listed resource kind,
    /// in checkpoint order.
    pub fn devices_for(&self, sandbox_id: &str, allowed: &[String]) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.pod_uid == sandbox_id)
            .filter(|e| allowed.iter().any(|r| *r == e.resource_name))
            .flat_map(|e| e.device_ids.iter().map(str::to_string))
            .collect()
    }
}

/// Looks devices up in the checkpoint at a fixed path.
#[derive(Debug, Clone)]
pub struct DeviceLocator {
    path: PathBuf,
    allowed: Vec<String>,
}

impl DeviceLocator {
    pub fn new(path: PathBuf, allowed: Vec<String>) -> Self {
        Self { path, allowed }
    }

    pub async fn locate(&self, sandbox_id: &str) -> Result<Vec<String>> {
        let checkpoint = Checkpoint::read(&self.path).await?;
        let devices = checkpoint.devices_for(sandbox_id, &self.allowed);
        debug!(sandbox_id, ?devices, "located hardware devices");
        Ok(devices)
    }
}
