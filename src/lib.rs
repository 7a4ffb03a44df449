//! Re-exports the crates that make up the workspace, the way `edge-net`
//! re-exports its member crates.

pub use psa_proto as proto;
pub use psa_wire as wire;

#[cfg(feature = "std")]
pub use psa_client as client;
#[cfg(feature = "std")]
pub use psa_ifconfig as ifconfig;
#[cfg(feature = "std")]
pub use psa_net_std as net_std;
#[cfg(feature = "std")]
pub use psa_server as server;

pub use psa_net as net;
