//! The eight-state DHCP lease state machine that runs against one
//! interface's raw AF_PACKET sockets. See [`Client`] for the entry point.

mod callback;
mod client;
mod error;
pub mod limiter;
mod netio;
mod state;

pub use callback::ScriptCallback;
pub use client::{Client, ClientConfig};
pub use error::Error;
pub use state::{Deadlines, State};
