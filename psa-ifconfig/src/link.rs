//! Contract-only: the netlink interface-up monitor. A real implementation
//! needs a live netlink route/link multicast-group subscription, which
//! can't be exercised by the testable properties this crate carries; only
//! the shape the resume-on-link-event wrapper in `psa-client` needs is
//! defined here.

/// A link-state transition observed on the monitored interface.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LinkEvent {
    Up,
    Down,
}

/// Watches one interface for link up/down transitions.
#[allow(async_fn_in_trait)]
pub trait LinkWatcher {
    /// Resolves when the next transition occurs.
    async fn watch(&self) -> LinkEvent;
}
