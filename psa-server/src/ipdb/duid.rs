//! The opaque client identifier (distilled spec §3): either a client-supplied
//! option-61 value, or a synthesized `00 03 00 00 || mac` DUID-LL for
//! static-lease clients.

use std::fmt;

/// An opaque byte sequence identifying a client, at least 4 bytes long for
/// any value this system accepts from the wire.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Duid(pub Vec<u8>);

impl Duid {
    /// Synthesizes the internal DUID-LL form for a MAC (`psa_wire::duid_ll_from_mac`):
    /// `00 03 00 00` (a reserved-zero hw type, so this can never collide with
    /// a client-supplied identifier) followed by the 6 MAC bytes.
    pub fn from_mac(mac: [u8; 6]) -> Self {
        Self(psa_wire::duid_ll_from_mac(mac))
    }

    /// Wraps a client-supplied option-61 value verbatim.
    pub fn from_client_identifier(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Duid {
    /// Hex-with-dashes, matching the original's `Duid.String()` -- log lines
    /// in the corpus render DUIDs this way.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "<duid:nil>");
        }
        write!(f, "<duid:")?;
        for (i, b) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "-")?;
            }
            write!(f, "{b:02x}")?;
        }
        write!(f, ">")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesized_duid_has_reserved_zero_hwtype_prefix() {
        let duid = Duid::from_mac([0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        assert_eq!(duid.0, vec![0x00, 0x03, 0x00, 0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
    }

    #[test]
    fn display_is_hex_dashed() {
        let duid = Duid(vec![0xde, 0xad]);
        assert_eq!(duid.to_string(), "<duid:de-ad>");
    }

    #[test]
    fn display_handles_empty() {
        assert_eq!(Duid(vec![]).to_string(), "<duid:nil>");
    }
}
