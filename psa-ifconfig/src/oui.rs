//! Contract-only: the OUI vendor-lookup table. Out of scope per §1; nothing
//! downstream of it (a vendor name in a log line) is part of any tested
//! invariant, so only the shape is defined.

/// Resolves the IEEE-assigned vendor for a MAC address's OUI.
pub trait OuiTable {
    fn vendor(&self, mac: &[u8; 6]) -> Option<&str>;
}
