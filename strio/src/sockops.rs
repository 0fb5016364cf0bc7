//! Thin wrappers over the socket syscalls the transports use.

use std::mem;
use std::os::fd::RawFd;

use socket2::SockAddr;

use crate::addr::AddrList;
use crate::error::Result;

#[cfg(any(target_os = "linux", target_os = "android"))]
const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SEND_FLAGS: libc::c_int = 0;

/// Listen backlog for freshly opened accept sockets.
const LISTEN_BACKLOG: libc::c_int = 128;

/// One open listening socket.
pub struct ListenFd {
  pub fd: RawFd,
  pub family: libc::c_int,
}

pub fn close_fd(fd: RawFd) {
  // SAFETY: callers keep fds single-owner, so this is the only close.
  unsafe { libc::close(fd) };
}

/// `send` with EINTR retry. `flags` is or-ed with the platform's
/// no-SIGPIPE flag.
pub fn os_send(fd: RawFd, buf: &[u8], flags: libc::c_int) -> Result<usize> {
  let n = syscall!(retry send(
    fd,
    buf.as_ptr().cast::<libc::c_void>(),
    buf.len(),
    flags | SEND_FLAGS
  ))?;
  Ok(n as usize)
}

/// `recv` with EINTR retry.
pub fn os_recv(fd: RawFd, buf: &mut [u8], flags: libc::c_int) -> Result<usize> {
  let n = syscall!(retry recv(
    fd,
    buf.as_mut_ptr().cast::<libc::c_void>(),
    buf.len(),
    flags
  ))?;
  Ok(n as usize)
}

/// Accepts one pending connection, returning the new fd and the peer
/// address.
pub fn os_accept(fd: RawFd) -> Result<(RawFd, SockAddr)> {
  // SAFETY: accept4 writes a valid sockaddr through the storage/len
  // pointers the closure receives.
  let (new_fd, addr) = unsafe {
    SockAddr::try_init(|storage, len| {
      syscall!(accept4(
        fd,
        storage.cast::<libc::sockaddr>(),
        len,
        libc::SOCK_CLOEXEC
      ))
    })
  }?;
  Ok((new_fd, addr))
}

/// Creates a non-inheritable stream socket of the given family.
pub fn new_socket(family: libc::c_int) -> Result<RawFd> {
  let fd =
    syscall!(socket(family, libc::SOCK_STREAM | libc::SOCK_CLOEXEC, 0))?;
  Ok(fd)
}

pub fn set_nonblocking(fd: RawFd) -> Result<()> {
  let flags = syscall!(fcntl(fd, libc::F_GETFL))?;
  syscall!(fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK))?;
  Ok(())
}

pub fn set_bool_opt(
  fd: RawFd,
  level: libc::c_int,
  opt: libc::c_int,
  on: bool,
) -> Result<()> {
  let val: libc::c_int = on as libc::c_int;
  syscall!(setsockopt(
    fd,
    level,
    opt,
    (&val as *const libc::c_int).cast::<libc::c_void>(),
    mem::size_of::<libc::c_int>() as libc::socklen_t
  ))?;
  Ok(())
}

pub fn get_int_opt(
  fd: RawFd,
  level: libc::c_int,
  opt: libc::c_int,
) -> Result<libc::c_int> {
  let mut val: libc::c_int = 0;
  let mut len = mem::size_of::<libc::c_int>() as libc::socklen_t;
  syscall!(getsockopt(
    fd,
    level,
    opt,
    (&mut val as *mut libc::c_int).cast::<libc::c_void>(),
    &mut len
  ))?;
  Ok(val)
}

/// Reads and clears the pending socket error.
pub fn sock_error(fd: RawFd) -> Result<libc::c_int> {
  get_int_opt(fd, libc::SOL_SOCKET, libc::SO_ERROR)
}

pub fn os_connect(fd: RawFd, addr: &SockAddr) -> Result<()> {
  syscall!(connect(fd, addr.as_ptr(), addr.len()))?;
  Ok(())
}

pub fn os_bind(fd: RawFd, addr: &SockAddr) -> Result<()> {
  syscall!(bind(fd, addr.as_ptr(), addr.len()))?;
  Ok(())
}

/// Local address of a bound socket.
pub fn local_sockaddr(fd: RawFd) -> Result<SockAddr> {
  // SAFETY: getsockname fills the storage/len pair the closure
  // receives.
  let ((), addr) = unsafe {
    SockAddr::try_init(|storage, len| {
      syscall!(getsockname(fd, storage.cast::<libc::sockaddr>(), len))
        .map(drop)
    })
  }?;
  Ok(addr)
}

/// Opens a listening socket for every entry, all-or-nothing.
pub fn open_listen_sockets(addrs: &AddrList) -> Result<Vec<ListenFd>> {
  let mut fds: Vec<ListenFd> = Vec::with_capacity(addrs.len());
  for addr in addrs.iter() {
    let family = addr.family() as libc::c_int;
    match open_one_listener(addr, family) {
      Ok(fd) => fds.push(ListenFd { fd, family }),
      Err(err) => {
        for lf in fds {
          close_fd(lf.fd);
        }
        return Err(err);
      }
    }
  }
  Ok(fds)
}

fn open_one_listener(addr: &SockAddr, family: libc::c_int) -> Result<RawFd> {
  let fd = new_socket(family)?;
  let res: Result<()> = (|| {
    set_bool_opt(fd, libc::SOL_SOCKET, libc::SO_REUSEADDR, true)?;
    if family == libc::AF_INET6 {
      set_bool_opt(fd, libc::IPPROTO_IPV6, libc::IPV6_V6ONLY, true)?;
    }
    set_nonblocking(fd)?;
    os_bind(fd, addr)?;
    syscall!(listen(fd, LISTEN_BACKLOG))?;
    Ok(())
  })();
  match res {
    Ok(()) => Ok(fd),
    Err(err) => {
      close_fd(fd);
      Err(err)
    }
  }
}
