//! Deterministic names derived from sandbox identity.
//!
//! Teardown never consults stored state: it recomputes the same names from the
//! sandbox ID that attach used.

use mac_address::MacAddress;
use sha2::{Digest, Sha256};

use crate::error::{ProvisionError, Result};

/// Number of leading sandbox-ID characters used in link names.
pub const SANDBOX_PREFIX_LEN: usize = 12;
/// Kernel limit on interface name length, excluding the NUL terminator.
pub const IFNAME_MAX_LEN: usize = 15;

const HOST_SUFFIX: &str = "_h";
const CONTAINER_SUFFIX: &str = "_c";

/// Host/container interface names for one sandbox.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkPair {
    pub host: String,
    pub container: String,
}

impl LinkPair {
    pub fn for_sandbox(sandbox_id: &str) -> Result<Self> {
        let prefix = sandbox_prefix(sandbox_id)?;
        Ok(Self {
            host: format!("{prefix}{HOST_SUFFIX}"),
            container: format!("{prefix}{CONTAINER_SUFFIX}"),
        })
    }
}

/// The fixed-length identity prefix of a sandbox ID.
fn sandbox_prefix(sandbox_id: &str) -> Result<&str> {
    let prefix = sandbox_id.get(..SANDBOX_PREFIX_LEN).ok_or_else(|| {
        ProvisionError::InvalidRequest(format!(
            "sandbox id {sandbox_id:?} shorter than {SANDBOX_PREFIX_LEN} characters"
        ))
    })?;
    if !prefix
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'.')
    {
        return Err(ProvisionError::InvalidRequest(format!(
            "sandbox id {sandbox_id:?} contains characters not allowed in interface names"
        )));
    }
    Ok(prefix)
}

/// External identifier the control plane uses to correlate a bridge port with
/// its logical switch port.
pub fn iface_id(pod_name: &str, pod_namespace: &str) -> String {
    format!("{pod_name}.{pod_namespace}")
}

/// MAC address for a sandbox that was not given one.
///
/// Derived from the sandbox ID so that a retried attach converges on the same
/// address. Locally administered, unicast.
pub fn derive_mac(sandbox_id: &str) -> MacAddress {
    let digest = Sha256::digest(sandbox_id.as_bytes());
    let mut bytes = [0u8; 6];
    for (dst, src) in bytes.iter_mut().zip(digest.iter()) {
        *dst = *src;
    }
    bytes[0] = (bytes[0] | 0x02) & 0xfe;
    MacAddress::new(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SANDBOX: &str = "abcdef0123456789abcdef0123456789";

    #[test]
    fn link_names_use_twelve_char_prefix() {
        let pair = LinkPair::for_sandbox(SANDBOX).unwrap();
        assert_eq!(pair.host, "abcdef012345_h");
        assert_eq!(pair.container, "abcdef012345_c");
    }

    #[test]
    fn link_names_are_stable_across_calls() {
        let first = LinkPair::for_sandbox(SANDBOX).unwrap();
        for _ in 0..3 {
            assert_eq!(LinkPair::for_sandbox(SANDBOX).unwrap(), first);
        }
    }

    #[test]
    fn link_names_fit_ifnamsiz() {
        let pair = LinkPair::for_sandbox(SANDBOX).unwrap();
        assert!(pair.host.len() <= IFNAME_MAX_LEN);
        assert!(pair.container.len() <= IFNAME_MAX_LEN);
    }

    #[test]
    fn distinct_prefixes_give_distinct_names() {
        let a = LinkPair::for_sandbox("aaaaaaaaaaaa0000").unwrap();
        let b = LinkPair::for_sandbox("aaaaaaaaaaab0000").unwrap();
        assert_ne!(a.host, b.host);
        assert_ne!(a.container, b.container);
    }

    #[test]
    fn short_sandbox_id_is_rejected() {
        let err = LinkPair::for_sandbox("abc").unwrap_err();
        assert!(matches!(err, ProvisionError::InvalidRequest(_)), "got: {err}");
    }

    #[test]
    fn sandbox_id_with_slash_is_rejected() {
        let err = LinkPair::for_sandbox("abc/ef012345xyz").unwrap_err();
        assert!(matches!(err, ProvisionError::InvalidRequest(_)), "got: {err}");
    }

    #[test]
    fn multibyte_boundary_is_rejected_not_panicking() {
        assert!(LinkPair::for_sandbox("abcdefghijkéxyz").is_err());
    }

    #[test]
    fn iface_id_joins_name_and_namespace() {
        assert_eq!(iface_id("pod1", "ns1"), "pod1.ns1");
    }

    #[test]
    fn derived_mac_is_stable_local_unicast() {
        let mac = derive_mac(SANDBOX);
        assert_eq!(mac, derive_mac(SANDBOX));
        let first = mac.bytes()[0];
        assert_eq!(first & 0x02, 0x02, "locally administered bit");
        assert_eq!(first & 0x01, 0x00, "unicast");
        assert_ne!(mac, derive_mac("0123456789abcdef"));
    }
}
