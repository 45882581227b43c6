//! Local address enumeration.
//!
//! Resolves the machine's host name and reports the addresses it maps to,
//! IPv4 and IPv6, capped at [`MAX_INTERNAL_ADDRESSES`].

use std::collections::HashSet;
use std::io;
use std::net::{IpAddr, ToSocketAddrs};
use tracing::debug;

/// Maximum number of local addresses reported
pub const MAX_INTERNAL_ADDRESSES: usize = 10;

/// Return this machine's host name
///
/// # Errors
///
/// Returns the OS error if the name cannot be read or is not valid UTF-8.
#[cfg(unix)]
pub fn hostname() -> io::Result<String> {
    let mut buf = [0u8; 256];

    // SAFETY: buf is valid for writes of buf.len() bytes for the duration of the call
    let rc = unsafe { libc::gethostname(buf.as_mut_ptr().cast::<libc::c_char>(), buf.len()) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }

    let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8(buf[..len].to_vec())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Return this machine's host name
///
/// # Errors
///
/// Returns `NotFound` if the environment does not carry the computer name.
#[cfg(not(unix))]
pub fn hostname() -> io::Result<String> {
    std::env::var("COMPUTERNAME")
        .map_err(|e| io::Error::new(io::ErrorKind::NotFound, e))
}

/// Addresses the local host name resolves to, in resolver order
///
/// Duplicates are removed. An empty list means the resolver knew the name
/// but returned nothing.
///
/// # Errors
///
/// Returns an error if the host name cannot be read or resolved.
pub fn local_addresses() -> io::Result<Vec<IpAddr>> {
    let name = hostname()?;
    let resolved = (name.as_str(), 0u16).to_socket_addrs()?;

    let addresses = dedup_capped(resolved.map(|addr| addr.ip()));
    debug!("Host {} resolves to {:?}", name, addresses);
    Ok(addresses)
}

fn dedup_capped(addresses: impl Iterator<Item = IpAddr>) -> Vec<IpAddr> {
    let mut seen = HashSet::new();
    addresses
        .filter(|ip| seen.insert(*ip))
        .take(MAX_INTERNAL_ADDRESSES)
        .collect()
}
