//! The two interface lookups neither `psa-net` nor `psa-wire` needs at
//! runtime but every caller setting up a socket by name does: resolving
//! an interface name to its kernel index and its own hardware address.
//! Same `ioctl`/`SIOC*` family the raw-socket bind path already leans on.

use std::ffi::CString;
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd};

use psa_net::MacAddr;

/// Resolves an interface name (e.g. `"eth0"`) to its kernel ifindex.
pub fn index_of(ifname: &str) -> io::Result<u32> {
    let cname = CString::new(ifname).map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "nul in ifname"))?;
    let index = unsafe { libc::if_nametoindex(cname.as_ptr()) };
    if index == 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(index)
}

/// Reads the interface's own MAC address via `SIOCGIFHWADDR` on a throwaway
/// datagram socket, the same ioctl every `ifconfig`-alike uses.
pub fn hwaddr_of(ifname: &str) -> io::Result<MacAddr> {
    if ifname.len() >= libc::IFNAMSIZ {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "ifname too long"));
    }

    let sock = unsafe { libc::socket(libc::AF_INET, libc::SOCK_DGRAM, 0) };
    if sock < 0 {
        return Err(io::Error::last_os_error());
    }
    let sock = unsafe { std::net::UdpSocket::from_raw_fd(sock) };

    let mut req: libc::ifreq = unsafe { mem::zeroed() };
    for (dst, src) in req.ifr_name.iter_mut().zip(ifname.as_bytes()) {
        *dst = *src as libc::c_char;
    }

    let ret = unsafe { libc::ioctl(sock.as_raw_fd(), libc::SIOCGIFHWADDR, &mut req) };
    if ret < 0 {
        return Err(io::Error::last_os_error());
    }

    let sa_data = unsafe { req.ifr_ifru.ifru_hwaddr.sa_data };
    let mut mac = [0u8; 6];
    for (dst, src) in mac.iter_mut().zip(sa_data.iter()) {
        *dst = *src as u8;
    }
    Ok(mac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_of_rejects_a_nonexistent_interface() {
        assert!(index_of("psa-definitely-not-a-real-nic-0").is_err());
    }

    #[test]
    fn hwaddr_of_rejects_an_overlong_name() {
        let long = "x".repeat(libc::IFNAMSIZ + 1);
        assert!(hwaddr_of(&long).is_err());
    }
}
