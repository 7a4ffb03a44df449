//! Traits modeling raw link-layer datagram sockets, generalized from a
//! broader embedded network-abstraction layer down to just the pieces a
//! link-layer DHCP agent needs: send/receive a frame, know when one is
//! waiting.

#![cfg_attr(not(feature = "std"), no_std)]
#![allow(async_fn_in_trait)]

pub use raw::*;
pub use readable::*;

mod raw;
mod readable;
