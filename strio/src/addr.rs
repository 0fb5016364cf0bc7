//! Resolved network address lists.

use std::mem;
use std::net::{SocketAddr, ToSocketAddrs};

use socket2::SockAddr;

use crate::error::{Error, Result};

/// An immutable list of resolved socket addresses.
///
/// Connect attempts walk the entries in order; listeners bind every
/// entry. Lists are never empty.
#[derive(Clone)]
pub struct AddrList {
  entries: Vec<SockAddr>,
}

impl AddrList {
  /// Builds a list from already-resolved addresses.
  pub fn from_sockaddrs(addrs: &[SocketAddr]) -> Result<AddrList> {
    if addrs.is_empty() {
      return Err(Error::InvalidArgument);
    }
    Ok(AddrList {
      entries: addrs.iter().map(|a| SockAddr::from(*a)).collect(),
    })
  }

  pub(crate) fn from_entries(entries: Vec<SockAddr>) -> Result<AddrList> {
    if entries.is_empty() {
      return Err(Error::InvalidArgument);
    }
    Ok(AddrList { entries })
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn get(&self, idx: usize) -> Option<&SockAddr> {
    self.entries.get(idx)
  }

  /// First entry; lists are never empty.
  pub fn first(&self) -> &SockAddr {
    &self.entries[0]
  }

  pub fn iter(&self) -> impl Iterator<Item = &SockAddr> {
    self.entries.iter()
  }

  /// The entries that map to IPv4/IPv6 socket addresses.
  pub fn socket_addrs(&self) -> Vec<SocketAddr> {
    self.entries.iter().filter_map(|a| a.as_socket()).collect()
  }

  /// True if any entry exceeds the platform's generic sockaddr storage.
  pub(crate) fn any_too_big(&self) -> bool {
    let max = mem::size_of::<libc::sockaddr_storage>();
    self.entries.iter().any(|a| a.len() as usize > max)
  }
}

/// Renders one resolved address as text.
pub fn format_sockaddr(addr: &SockAddr) -> Result<String> {
  match addr.as_socket() {
    Some(sa) => Ok(sa.to_string()),
    None => Err(Error::InvalidArgument),
  }
}

/// Resolves an address string into a list.
///
/// `listen` selects the passive form: a bare `:port` expands to the
/// wildcard address, the way a missing host does in getaddrinfo.
pub fn scan_netaddr(s: &str, listen: bool) -> Result<AddrList> {
  let s = s.trim();
  if s.is_empty() {
    return Err(Error::InvalidArgument);
  }
  let expanded;
  let target = if listen && s.starts_with(':') {
    expanded = format!("0.0.0.0{s}");
    &expanded
  } else {
    s
  };
  let resolved: Vec<SocketAddr> = target
    .to_socket_addrs()
    .map_err(|_| Error::InvalidArgument)?
    .collect();
  AddrList::from_sockaddrs(&resolved)
}

/// Splits `host:port,key=value,...` into the resolved list and the
/// trailing argument strings.
pub fn scan_netaddr_args(
  s: &str,
  listen: bool,
) -> Result<(AddrList, Vec<String>)> {
  let mut parts = s.split(',');
  let addr_part = parts.next().ok_or(Error::InvalidArgument)?;
  let args: Vec<String> = parts.map(str::to_owned).collect();
  let addrs = scan_netaddr(addr_part, listen)?;
  Ok((addrs, args))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn scans_a_literal_address() {
    let list = scan_netaddr("127.0.0.1:4321", false).unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list.socket_addrs()[0], "127.0.0.1:4321".parse().unwrap());
  }

  #[test]
  fn bare_port_expands_to_wildcard_in_listen_form() {
    let list = scan_netaddr(":4321", true).unwrap();
    assert_eq!(list.socket_addrs()[0], "0.0.0.0:4321".parse().unwrap());
    assert!(scan_netaddr(":4321", false).is_err());
  }

  #[test]
  fn missing_port_is_invalid() {
    assert!(scan_netaddr("127.0.0.1", false).is_err());
    assert!(scan_netaddr("", false).is_err());
  }

  #[test]
  fn trailing_args_split_off() {
    let (list, args) =
      scan_netaddr_args("127.0.0.1:80,nodelay,readbuf=512", false).unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(args, vec!["nodelay".to_owned(), "readbuf=512".to_owned()]);
  }

  #[test]
  fn empty_list_is_rejected() {
    assert!(AddrList::from_sockaddrs(&[]).is_err());
  }
}
