use std::fmt;

use crate::ipdb::{Duid, Uip};

/// The one error type this crate returns; mirrors the hand-rolled
/// `Error`/`Display` pattern the rest of the workspace uses instead of
/// pulling in `thiserror`.
#[derive(Debug)]
pub enum Error {
    InvalidNetwork,
    InvalidNetmask,
    NotAnIpv4,
    IpNotInManagedRange,
    DynamicRangeInverted,
    DynamicRangeOutsideNetwork,
    DynamicSearchDisabled,
    NoFreeIpFound,
    NoSuchClient,
    NoSuchLease,
    IpAlreadyBound(Uip),
    DuidAlreadyBound(Duid),
    IpDuidMismatch,
    LeaseDurationTooShort,
    DuplicateClientMac([u8; 6]),
    Io(std::io::Error),
    Wire(psa_wire::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidNetwork => write!(f, "invalid network address"),
            Error::InvalidNetmask => write!(f, "invalid netmask"),
            Error::NotAnIpv4 => write!(f, "not an ipv4 address"),
            Error::IpNotInManagedRange => write!(f, "ip is not in managed range"),
            Error::DynamicRangeInverted => write!(f, "begin in dynamic range cannot be larger than end"),
            Error::DynamicRangeOutsideNetwork => write!(f, "dynamic range is not within the managed network"),
            Error::DynamicSearchDisabled => write!(f, "dynamic searches are disabled"),
            Error::NoFreeIpFound => write!(f, "no free ip found"),
            Error::NoSuchClient => write!(f, "no such client found"),
            Error::NoSuchLease => write!(f, "no such lease found"),
            Error::IpAlreadyBound(uip) => write!(f, "{uip} is already bound to a different client"),
            Error::DuidAlreadyBound(duid) => write!(f, "{duid} already holds a different lease"),
            Error::IpDuidMismatch => write!(f, "ip and duid resolve to different entries"),
            Error::LeaseDurationTooShort => write!(f, "lease duration must be at least 60 seconds"),
            Error::DuplicateClientMac(mac) => write!(f, "duplicate client override for mac {mac:02x?}"),
            Error::Io(e) => write!(f, "io error: {e}"),
            Error::Wire(e) => write!(f, "wire codec error: {e}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<psa_wire::Error> for Error {
    fn from(e: psa_wire::Error) -> Self {
        Error::Wire(e)
    }
}
