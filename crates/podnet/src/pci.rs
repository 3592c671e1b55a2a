//! PCI function addressing in extended BDF form: `domain:bus:device.function`
//! (e.g. `0000:03:00.2`).

use std::fmt;
use std::str::FromStr;

/// Highest device number on a bus (5 bits).
const MAX_DEVICE: u8 = 0x1f;
/// Highest function number within a device (3 bits).
const MAX_FUNCTION: u8 = 0x7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PciAddress {
    pub domain: u16,
    pub bus: u8,
    pub device: u8,
    pub function: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid pci address {input:?}: {reason}")]
pub struct PciAddressParseError {
    pub input: String,
    pub reason: &'static str,
}

impl FromStr for PciAddress {
    type Err = PciAddressParseError;

    /// Accepts `DDDD:BB:DD.F`, or the short `BB:DD.F` form with domain 0.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |reason| PciAddressParseError {
            input: s.to_string(),
            reason,
        };

        let (head, function) = s.rsplit_once('.').ok_or_else(|| err("missing function"))?;
        let mut parts = head.rsplitn(3, ':');
        let device = parts.next().ok_or_else(|| err("missing device"))?;
        let bus = parts.next().ok_or_else(|| err("missing bus"))?;
        let domain = parts.next();

        let domain = match domain {
            Some(d) => parse_hex_field(d, 4).ok_or_else(|| err("bad domain"))?,
            None => 0,
        };
        let bus = parse_hex_field(bus, 2)
            .and_then(|v| u8::try_from(v).ok())
            .ok_or_else(|| err("bad bus"))?;
        let device = parse_hex_field(device, 2)
            .and_then(|v| u8::try_from(v).ok())
            .filter(|v| *v <= MAX_DEVICE)
            .ok_or_else(|| err("bad device"))?;
        let function = parse_hex_field(function, 1)
            .and_then(|v| u8::try_from(v).ok())
            .filter(|v| *v <= MAX_FUNCTION)
            .ok_or_else(|| err("bad function"))?;

        Ok(Self {
            domain,
            bus,
            device,
            function,
        })
    }
}

/// Parse a fixed-width hex field; width is exact, like the kernel prints it.
fn parse_hex_field(s: &str, width: usize) -> Option<u16> {
    if s.len() != width || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u16::from_str_radix(s, 16).ok()
}

impl fmt::Display for PciAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04x}:{:02x}:{:02x}.{:x}",
            self.domain, self.bus, self.device, self.function
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_form() {
        let addr: PciAddress = "0000:03:00.2".parse().unwrap();
        assert_eq!(
            addr,
            PciAddress {
                domain: 0,
                bus: 3,
                device: 0,
                function: 2
            }
        );
        assert_eq!(addr.to_string(), "0000:03:00.2");
    }

    #[test]
    fn parses_short_form_with_domain_zero() {
        let addr: PciAddress = "af:1f.7".parse().unwrap();
        assert_eq!(addr.to_string(), "0000:af:1f.7");
    }

    #[test]
    fn display_is_lowercase() {
        let addr: PciAddress = "00AB:CD:01.1".parse().unwrap();
        assert_eq!(addr.to_string(), "00ab:cd:01.1");
    }

    #[test]
    fn rejects_out_of_range_device_and_function() {
        assert!("0000:03:20.0".parse::<PciAddress>().is_err());
        assert!("0000:03:00.8".parse::<PciAddress>().is_err());
    }

    #[test]
    fn rejects_malformed() {
        for bad in ["", "0000:03:00", "0000-03-00.0", "000:03:00.0", "0000:3:00.0", "x:y:z.w"] {
            let err = bad.parse::<PciAddress>().unwrap_err();
            assert_eq!(err.input, bad);
        }
    }
}
