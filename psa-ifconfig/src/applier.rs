use crate::{Error, IfaceConfig};

/// The collaborator that turns an [`IfaceConfig`] into kernel state (§4.9).
/// Calls are rare (once per state transition) and are expected to block the
/// calling thread until the kernel has acknowledged the change.
pub trait Applier {
    /// Idempotently replaces the interface's address, reconciles the
    /// default route, and applies the MTU if it differs.
    fn apply(&self, config: &IfaceConfig) -> Result<(), Error>;

    /// Removes every IPv4 address whose label equals `ifname` exactly
    /// (alias addresses like `ifname:0` are left alone) and any default
    /// route out of this interface.
    fn unconfigure(&self, ifname: &str) -> Result<(), Error>;
}
