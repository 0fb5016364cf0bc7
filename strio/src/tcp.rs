//! TCP transport endpoints.
//!
//! The client connector walks a resolved candidate list with
//! non-blocking connects: synchronous failures fall through to the
//! next candidate, asynchronous failures are retried through the fd
//! framework's clear/retry cycle, and the error that finally surfaces
//! is the one from the last candidate tried. The accepter owns a set
//! of listening sockets with an asynchronous, acknowledged teardown.
//!
//! Both directions share one option surface: keepalive and address
//! reuse are always set, `TCP_NODELAY` is opt-in and adjustable at
//! runtime through the `"nodelay"` control, and urgent data flows both
//! ways as records tagged `"oob"`.

use std::os::fd::RawFd;
use std::sync::Arc;

use socket2::SockAddr;

use crate::accepter::{AccCore, Accepter, AccepterEvents, AccepterOps};
use crate::addr::{self, AddrList};
use crate::args;
use crate::error::{Error, Result};
use crate::fdio::{
  ExceptData, FdIo, FdOps, OpenProgress, DEFAULT_READ_BUF_SIZE,
};
use crate::selector::{FdHandler, Selector};
use crate::sockops::{self, ListenFd};
use crate::stream::{Stream, StreamEvents};
use crate::sync::Mutex;

/// Control option adjusting `TCP_NODELAY` at runtime.
///
/// Get renders the current value as a decimal string; set parses the
/// buffer as an unsigned integer with auto-detected base and applies
/// it as a boolean.
///
/// # Examples
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use strio::{Selector, StreamEvents};
/// # struct OnRead;
/// # impl StreamEvents for OnRead {
/// #   fn read(&self, _data: strio::Result<&[u8]>, _aux: &[&str]) {}
/// # }
/// # let sel = Selector::new().unwrap();
/// # let stream = strio::tcp::stream_from_str(
/// #   "127.0.0.1:3023", &[], &sel, Arc::new(OnRead)).unwrap();
/// let mut value = String::from("1");
/// stream.control(false, strio::tcp::CONTROL_NODELAY, &mut value).unwrap();
///
/// let mut out = String::new();
/// stream.control(true, strio::tcp::CONTROL_NODELAY, &mut out).unwrap();
/// assert_eq!(out, "1");
/// ```
pub const CONTROL_NODELAY: &str = "nodelay";

const AUX_OOB: &[&str] = &["oob"];

/// State shared by the client and server fd ops.
struct TcpCommon {
  nodelay: bool,
  max_read_size: usize,
  local_bind: Option<AddrList>,
  remote: Mutex<Option<SockAddr>>,
}

/// Socket configuration common to both endpoint directions, applied in
/// a fixed order; the first failing step aborts.
fn socket_setup(common: &TcpCommon, fd: RawFd) -> Result<()> {
  sockops::set_nonblocking(fd)?;
  sockops::set_bool_opt(fd, libc::SOL_SOCKET, libc::SO_KEEPALIVE, true)?;
  sockops::set_bool_opt(fd, libc::SOL_SOCKET, libc::SO_REUSEADDR, true)?;
  if common.nodelay {
    sockops::set_bool_opt(fd, libc::IPPROTO_TCP, libc::TCP_NODELAY, true)?;
  }
  if let Some(local) = &common.local_bind {
    sockops::os_bind(fd, local.first())?;
  }
  Ok(())
}

/// Send path shared by both directions. The only recognized aux tag is
/// a case-insensitive `"oob"`; anything else aborts before any byte is
/// transmitted.
fn tcp_write(fd: RawFd, buf: &[u8], aux: &[&str]) -> Result<usize> {
  let mut flags = 0;
  for tag in aux {
    if tag.eq_ignore_ascii_case("oob") {
      flags |= libc::MSG_OOB;
    } else {
      return Err(Error::InvalidArgument);
    }
  }
  sockops::os_send(fd, buf, flags)
}

fn tcp_control(
  fd: RawFd,
  get: bool,
  option: &str,
  data: &mut String,
) -> Result<()> {
  match option {
    CONTROL_NODELAY => {
      if get {
        let val =
          sockops::get_int_opt(fd, libc::IPPROTO_TCP, libc::TCP_NODELAY)?;
        data.clear();
        data.push_str(&val.to_string());
      } else {
        let val = args::parse_uint_autobase(data)?;
        sockops::set_bool_opt(
          fd,
          libc::IPPROTO_TCP,
          libc::TCP_NODELAY,
          val != 0,
        )?;
      }
      Ok(())
    }
    _ => Err(Error::Unsupported),
  }
}

/// One urgent-flagged receive, delivered upward tagged `"oob"`.
fn tcp_except_ready(
  common: &TcpCommon,
  fd: RawFd,
) -> Result<Option<ExceptData>> {
  let mut buf = vec![0u8; common.max_read_size];
  match sockops::os_recv(fd, &mut buf, libc::MSG_OOB) {
    Ok(n) => {
      buf.truncate(n);
      Ok(Some(ExceptData { data: buf, aux: AUX_OOB }))
    }
    Err(err) if err.is_would_block() => Ok(None),
    Err(err) => Err(err),
  }
}

fn tcp_raddr_to_str(common: &TcpCommon) -> Result<String> {
  match &*common.remote.lock() {
    Some(remote) => addr::format_sockaddr(remote),
    None => Err(Error::Busy),
  }
}

fn tcp_get_raddr(common: &TcpCommon, buf: &mut [u8]) -> Result<usize> {
  let remote = common.remote.lock();
  let remote = remote.as_ref().ok_or(Error::Busy)?;
  // SAFETY: a SockAddr's storage holds at least `len` initialized
  // bytes.
  let bytes = unsafe {
    std::slice::from_raw_parts(
      remote.as_ptr().cast::<u8>(),
      remote.len() as usize,
    )
  };
  let n = bytes.len().min(buf.len());
  buf[..n].copy_from_slice(&bytes[..n]);
  Ok(n)
}

/// Connect-attempt cursor for the client side.
struct ConnCursor {
  curr: usize,
  last_err: Option<Error>,
}

/// Client-side fd ops: walks the candidate list.
struct TcpClientOps {
  common: TcpCommon,
  addrs: AddrList,
  cursor: Mutex<ConnCursor>,
}

impl TcpClientOps {
  /// Tries candidates starting at the cursor. A synchronous connect
  /// failure falls through to the next candidate on a fresh socket of
  /// that candidate's family; socket creation and setup failures are
  /// terminal.
  fn try_open(&self, cur: &mut ConnCursor) -> Result<OpenProgress> {
    loop {
      let candidate = match self.addrs.get(cur.curr) {
        Some(c) => c,
        None => return Err(self.exhausted(cur)),
      };
      let fd = sockops::new_socket(candidate.family() as libc::c_int)?;
      if let Err(err) = socket_setup(&self.common, fd) {
        sockops::close_fd(fd);
        return Err(err);
      }
      match sockops::os_connect(fd, candidate) {
        Ok(()) => {
          *self.common.remote.lock() = Some(candidate.clone());
          return Ok(OpenProgress::Ready(fd));
        }
        Err(err) if err.os_error() == Some(libc::EINPROGRESS) => {
          return Ok(OpenProgress::InProgress(fd));
        }
        Err(err) => {
          sockops::close_fd(fd);
          cur.last_err = Some(err);
          cur.curr += 1;
        }
      }
    }
  }

  fn exhausted(&self, cur: &ConnCursor) -> Error {
    // The list is never empty, so an error has always been recorded.
    cur.last_err.clone().unwrap_or(Error::Busy)
  }
}

impl FdOps for TcpClientOps {
  fn sub_open(&self) -> Result<OpenProgress> {
    let mut cur = self.cursor.lock();
    cur.curr = 0;
    cur.last_err = None;
    self.try_open(&mut cur)
  }

  fn check_open(&self, fd: RawFd) -> Result<()> {
    let mut cur = self.cursor.lock();
    let pending = sockops::sock_error(fd).map_err(|err| {
      cur.last_err = Some(err.clone());
      err
    })?;
    if pending != 0 {
      let err = Error::Os(pending);
      cur.last_err = Some(err.clone());
      return Err(err);
    }
    if let Some(candidate) = self.addrs.get(cur.curr) {
      *self.common.remote.lock() = Some(candidate.clone());
    }
    Ok(())
  }

  fn retry_open(&self) -> Result<OpenProgress> {
    let mut cur = self.cursor.lock();
    cur.curr += 1;
    self.try_open(&mut cur)
  }

  fn write(&self, fd: RawFd, buf: &[u8], aux: &[&str]) -> Result<usize> {
    tcp_write(fd, buf, aux)
  }

  fn except_ready(&self, fd: RawFd) -> Result<Option<ExceptData>> {
    tcp_except_ready(&self.common, fd)
  }

  fn raddr_to_str(&self) -> Result<String> {
    tcp_raddr_to_str(&self.common)
  }

  fn get_raddr(&self, buf: &mut [u8]) -> Result<usize> {
    tcp_get_raddr(&self.common, buf)
  }

  fn control(
    &self,
    fd: RawFd,
    get: bool,
    option: &str,
    data: &mut String,
  ) -> Result<()> {
    tcp_control(fd, get, option, data)
  }
}

/// Server-side fd ops: the fd arrives connected, so the open hooks
/// stay at their unsupported defaults.
struct TcpServerOps {
  common: TcpCommon,
}

impl FdOps for TcpServerOps {
  fn write(&self, fd: RawFd, buf: &[u8], aux: &[&str]) -> Result<usize> {
    tcp_write(fd, buf, aux)
  }

  fn except_ready(&self, fd: RawFd) -> Result<Option<ExceptData>> {
    tcp_except_ready(&self.common, fd)
  }

  fn raddr_to_str(&self) -> Result<String> {
    tcp_raddr_to_str(&self.common)
  }

  fn get_raddr(&self, buf: &mut [u8]) -> Result<usize> {
    tcp_get_raddr(&self.common, buf)
  }

  fn control(
    &self,
    fd: RawFd,
    get: bool,
    option: &str,
    data: &mut String,
  ) -> Result<()> {
    tcp_control(fd, get, option, data)
  }
}

fn parse_stream_args(
  args_in: &[&str],
) -> Result<(usize, bool, Option<AddrList>)> {
  let mut max_read_size = DEFAULT_READ_BUF_SIZE;
  let mut nodelay = false;
  let mut local_bind = None;
  for arg in args_in {
    if let Some(size) = args::check_keyds(arg, "readbuf")? {
      max_read_size = size;
      continue;
    }
    if let Some(spec) = args::check_keyval(arg, "laddr") {
      local_bind = Some(addr::scan_netaddr(spec, true)?);
      continue;
    }
    if let Some(flag) = args::check_keybool(arg, "nodelay")? {
      nodelay = flag;
      continue;
    }
    return Err(Error::InvalidArgument);
  }
  Ok((max_read_size, nodelay, local_bind))
}

/// Allocates a TCP client endpoint over `addrs`.
///
/// Opening the returned stream walks the list in order until a
/// candidate accepts the connection; the error that surfaces on total
/// failure is the OS error from the last candidate tried.
///
/// # Arguments
///
/// - `addrs`: candidate peer addresses, tried in order.
/// - `args_in`: endpoint options — `readbuf=<size>` (read-buffer
///   size), `laddr=<address>` (bind locally before connecting),
///   `nodelay[=<bool>]` (`TCP_NODELAY` on every socket).
/// - `sel`: the reactor the endpoint registers with.
/// - `events`: receiver for inbound records.
///
/// # Errors
///
/// [`Error::InvalidArgument`] for an unrecognized or malformed
/// argument, [`Error::TooBig`] for an address entry that exceeds the
/// platform's sockaddr storage. Construction never creates an fd, so
/// a failure leaves nothing behind.
pub fn new_stream(
  addrs: &AddrList,
  args_in: &[&str],
  sel: &Selector,
  events: Arc<dyn StreamEvents>,
) -> Result<Stream> {
  let (max_read_size, nodelay, local_bind) = parse_stream_args(args_in)?;
  if addrs.any_too_big() {
    return Err(Error::TooBig);
  }
  let ops = TcpClientOps {
    common: TcpCommon {
      nodelay,
      max_read_size,
      local_bind,
      remote: Mutex::new(None),
    },
    addrs: addrs.clone(),
    cursor: Mutex::new(ConnCursor { curr: 0, last_err: None }),
  };
  let io = FdIo::new(sel, None, Box::new(ops), max_read_size);
  let stream = Stream::new(io);
  stream.set_events(events);
  stream.set_reliable(true);
  Ok(stream)
}

/// [`new_stream`] over a resolved address string (active form).
///
/// The string is `host:port`; a hostname resolving to several
/// addresses yields the full candidate list.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use strio::{Selector, StreamEvents};
///
/// struct OnRead;
///
/// impl StreamEvents for OnRead {
///   fn read(&self, _data: strio::Result<&[u8]>, _aux: &[&str]) {}
/// }
///
/// let sel = Selector::new().unwrap();
/// let stream = strio::tcp::stream_from_str(
///   "localhost:3023",
///   &["nodelay", "readbuf=4096"],
///   &sel,
///   Arc::new(OnRead),
/// )
/// .unwrap();
/// ```
pub fn stream_from_str(
  addr: &str,
  args_in: &[&str],
  sel: &Selector,
  events: Arc<dyn StreamEvents>,
) -> Result<Stream> {
  let addrs = addr::scan_netaddr(addr, false)?;
  new_stream(&addrs, args_in, sel, events)
}

struct NaState {
  setup: bool,
  enabled: bool,
  in_shutdown: bool,
  listen_fds: Option<Vec<ListenFd>>,
  nr_accept_close_waiting: usize,
  shutdown_done: Option<Box<dyn FnOnce() + Send>>,
}

/// Accepter-side state: the listen-socket set and its lifecycle.
struct TcpAccepterData {
  sel: Selector,
  core: AccCore,
  max_read_size: usize,
  nodelay: bool,
  addrs: AddrList,
  state: Mutex<NaState>,
}

impl TcpAccepterData {
  fn set_fd_enables(&self, st: &NaState, enable: bool) {
    if let Some(fds) = &st.listen_fds {
      for lf in fds {
        self.sel.set_read_handler(lf.fd, enable);
      }
    }
  }

  /// Caller holds the state lock.
  fn shutdown_locked(
    &self,
    st: &mut NaState,
    done: Option<Box<dyn FnOnce() + Send>>,
  ) {
    st.in_shutdown = true;
    st.shutdown_done = done;
    if let Some(fds) = &st.listen_fds {
      st.nr_accept_close_waiting = fds.len();
      for lf in fds {
        self.sel.clear_fd_handlers(lf.fd);
      }
    }
    st.setup = false;
    st.enabled = false;
  }
}

/// Best-effort full write, used for denial strings on a fd that is
/// about to be closed anyway.
fn write_nofail(fd: RawFd, mut data: &[u8]) {
  while !data.is_empty() {
    match sockops::os_send(fd, data, 0) {
      Ok(0) => break,
      Ok(n) => data = &data[n..],
      Err(_) => break,
    }
  }
}

fn accept_ready(na: &Arc<TcpAccepterData>, listen_fd: RawFd) {
  let (new_fd, peer) = match sockops::os_accept(listen_fd) {
    Ok(pair) => pair,
    Err(err) => {
      if !err.is_would_block() {
        na.core
          .log_err(&format!("Error accepting TCP connection: {err}"));
      }
      return;
    }
  };

  if let Some(denial) = na.core.check_connection(new_fd) {
    write_nofail(new_fd, denial.as_bytes());
    sockops::close_fd(new_fd);
    return;
  }

  let common = TcpCommon {
    nodelay: na.nodelay,
    max_read_size: na.max_read_size,
    local_bind: None,
    remote: Mutex::new(Some(peer)),
  };
  if let Err(err) = socket_setup(&common, new_fd) {
    na.core
      .log_err(&format!("Error setting up accepted socket: {err}"));
    sockops::close_fd(new_fd);
    return;
  }

  let io = FdIo::new(
    &na.sel,
    Some(new_fd),
    Box::new(TcpServerOps { common }),
    na.max_read_size,
  );
  let stream = Stream::new(io);

  // The pending registration and the open kickoff happen under the
  // accepter lock, like the lifecycle operations.
  let guard = na.state.lock();
  stream.set_reliable(true);
  na.core.add_pending(&stream);
  let na2 = na.clone();
  let pending = stream.clone();
  let res = stream.open(move |result| server_open_done(&na2, pending, result));
  drop(guard);

  if let Err(err) = res {
    na.core
      .log_err(&format!("Error registering accepted socket: {err}"));
    na.core.remove_pending(&stream);
  }
}

fn server_open_done(
  na: &Arc<TcpAccepterData>,
  stream: Stream,
  result: Result<()>,
) {
  na.core.remove_pending(&stream);
  match result {
    Ok(()) => na.core.new_connection(stream),
    Err(err) => {
      na.core
        .log_err(&format!("Error setting up TCP server stream: {err}"));
    }
  }
}

fn listen_fd_cleared(na: &TcpAccepterData, fd: RawFd) {
  sockops::close_fd(fd);

  let mut st = na.state.lock();
  st.nr_accept_close_waiting -= 1;
  let done = if st.nr_accept_close_waiting == 0 {
    st.in_shutdown = false;
    st.listen_fds = None;
    st.shutdown_done.take()
  } else {
    None
  };
  drop(st);

  if let Some(done) = done {
    done();
  }
}

/// Reactor-facing handler for the listen fds; each registration holds
/// a strong reference to the accepter state.
struct AccFdHandler(Arc<TcpAccepterData>);

impl FdHandler for AccFdHandler {
  fn read_ready(&self, fd: RawFd) {
    accept_ready(&self.0, fd);
  }

  fn cleared(&self, fd: RawFd) {
    listen_fd_cleared(&self.0, fd);
  }
}

/// Dispatcher for the public accepter operations.
struct TcpAccepterOps(Arc<TcpAccepterData>);

impl AccepterOps for TcpAccepterOps {
  fn startup(&self) -> Result<()> {
    let na = &self.0;
    let mut st = na.state.lock();
    if st.in_shutdown || st.setup {
      return Err(Error::Busy);
    }

    let fds = sockops::open_listen_sockets(&na.addrs)?;
    let mut registered = 0;
    for lf in &fds {
      match na.sel.set_fd_handlers(lf.fd, Arc::new(AccFdHandler(na.clone())))
      {
        Ok(()) => registered += 1,
        Err(err) => {
          for lf in &fds[..registered] {
            na.sel.clear_fd_handlers_norpt(lf.fd);
          }
          for lf in &fds {
            sockops::close_fd(lf.fd);
          }
          return Err(err);
        }
      }
    }

    st.listen_fds = Some(fds);
    st.setup = true;
    na.set_fd_enables(&st, true);
    st.enabled = true;
    st.shutdown_done = None;
    Ok(())
  }

  fn shutdown(&self, done: Box<dyn FnOnce() + Send>) -> Result<()> {
    let na = &self.0;
    let mut st = na.state.lock();
    if !st.setup {
      return Err(Error::Busy);
    }
    na.shutdown_locked(&mut st, Some(done));
    Ok(())
  }

  fn set_accept_callback_enable(&self, enable: bool) {
    let na = &self.0;
    let mut st = na.state.lock();
    if st.enabled != enable {
      na.set_fd_enables(&st, enable);
      st.enabled = enable;
    }
  }

  fn disable(&self) {
    let na = &self.0;
    let mut st = na.state.lock();
    st.in_shutdown = false;
    st.shutdown_done = None;
    if let Some(fds) = st.listen_fds.take() {
      for lf in &fds {
        na.sel.clear_fd_handlers_norpt(lf.fd);
      }
      for lf in &fds {
        sockops::close_fd(lf.fd);
      }
    }
    st.setup = false;
    st.enabled = false;
  }

  fn local_addr(&self) -> Result<AddrList> {
    let na = &self.0;
    let st = na.state.lock();
    let fds = st.listen_fds.as_ref().ok_or(Error::Busy)?;
    let mut entries = Vec::with_capacity(fds.len());
    for lf in fds {
      entries.push(sockops::local_sockaddr(lf.fd)?);
    }
    AddrList::from_entries(entries)
  }

  fn str_to_stream(
    &self,
    addr: &str,
    events: Arc<dyn StreamEvents>,
  ) -> Result<Stream> {
    let na = &self.0;
    let (addrs, iargs) = addr::scan_netaddr_args(addr, false)?;

    let mut max_read_size = na.max_read_size;
    let mut nodelay = na.nodelay;
    let mut laddr_arg: Option<String> = None;
    for arg in &iargs {
      if let Some(size) = args::check_keyds(arg, "readbuf")? {
        max_read_size = size;
        continue;
      }
      if args::check_keyval(arg, "laddr").is_some() {
        laddr_arg = Some(arg.clone());
        continue;
      }
      if let Some(flag) = args::check_keybool(arg, "nodelay")? {
        nodelay = flag;
        continue;
      }
      return Err(Error::InvalidArgument);
    }

    let mut child_args: Vec<String> = Vec::new();
    if max_read_size != DEFAULT_READ_BUF_SIZE {
      child_args.push(format!("readbuf={max_read_size}"));
    }
    if let Some(laddr) = laddr_arg {
      child_args.push(laddr);
    }
    if nodelay {
      child_args.push("nodelay".to_owned());
    }

    let refs: Vec<&str> = child_args.iter().map(String::as_str).collect();
    new_stream(&addrs, &refs, &na.sel, events)
  }

  fn free(&self) {
    let na = &self.0;
    let mut st = na.state.lock();
    if st.setup {
      na.shutdown_locked(&mut st, None);
    }
  }
}

/// Allocates a TCP accepter over the given local bind addresses.
///
/// The accepter binds every entry on startup, all-or-nothing. Each
/// accepted connection becomes a server-side [`Stream`] configured
/// with the accepter's defaults and delivered through
/// [`AccepterEvents::new_connection`].
///
/// # Arguments
///
/// - `addrs`: local addresses to bind; port 0 asks the OS for a port,
///   discoverable afterwards through
///   [`Accepter::local_addr`](crate::Accepter::local_addr).
/// - `args_in`: `readbuf=<size>` and `nodelay[=<bool>]`, the defaults
///   stamped onto every accepted connection.
/// - `sel`: the reactor the listen fds register with.
/// - `events`: receiver for new connections and log events.
///
/// # Errors
///
/// [`Error::InvalidArgument`] for an unrecognized or malformed
/// argument, [`Error::TooBig`] for an oversized address entry.
pub fn new_accepter(
  addrs: &AddrList,
  args_in: &[&str],
  sel: &Selector,
  events: Arc<dyn AccepterEvents>,
) -> Result<Accepter> {
  let mut max_read_size = DEFAULT_READ_BUF_SIZE;
  let mut nodelay = false;
  for arg in args_in {
    if let Some(size) = args::check_keyds(arg, "readbuf")? {
      max_read_size = size;
      continue;
    }
    if let Some(flag) = args::check_keybool(arg, "nodelay")? {
      nodelay = flag;
      continue;
    }
    return Err(Error::InvalidArgument);
  }
  if addrs.any_too_big() {
    return Err(Error::TooBig);
  }

  let data = Arc::new(TcpAccepterData {
    sel: sel.clone(),
    core: AccCore::new(events),
    max_read_size,
    nodelay,
    addrs: addrs.clone(),
    state: Mutex::new(NaState {
      setup: false,
      enabled: false,
      in_shutdown: false,
      listen_fds: None,
      nr_accept_close_waiting: 0,
      shutdown_done: None,
    }),
  });
  Ok(Accepter::new(Arc::new(TcpAccepterOps(data))))
}

/// [`new_accepter`] over a resolved address string (passive form; a
/// bare `:port` binds the wildcard address).
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::{mpsc, Arc};
/// use strio::{AccepterEvents, Selector, Stream};
///
/// struct OnConnection {
///   tx: mpsc::Sender<Stream>,
/// }
///
/// impl AccepterEvents for OnConnection {
///   fn new_connection(&self, stream: Stream) {
///     let _ = self.tx.send(stream);
///   }
/// }
///
/// let sel = Selector::new().unwrap();
/// let (tx, _rx) = mpsc::channel();
/// let acc = strio::tcp::accepter_from_str(
///   ":3023",
///   &["nodelay"],
///   &sel,
///   Arc::new(OnConnection { tx }),
/// )
/// .unwrap();
/// acc.startup().unwrap();
/// ```
pub fn accepter_from_str(
  addr: &str,
  args_in: &[&str],
  sel: &Selector,
  events: Arc<dyn AccepterEvents>,
) -> Result<Accepter> {
  let addrs = addr::scan_netaddr(addr, true)?;
  new_accepter(&addrs, args_in, sel, events)
}

#[cfg(test)]
mod tests {
  use super::*;

  struct NullEvents;

  impl StreamEvents for NullEvents {
    fn read(&self, _data: Result<&[u8]>, _aux: &[&str]) {}
  }

  struct NullAccEvents;

  impl AccepterEvents for NullAccEvents {
    fn new_connection(&self, _stream: Stream) {}
  }

  fn loopback() -> AddrList {
    AddrList::from_sockaddrs(&["127.0.0.1:1".parse().unwrap()]).unwrap()
  }

  #[test]
  fn unknown_stream_argument_is_rejected() {
    let sel = Selector::new().unwrap();
    let err = new_stream(&loopback(), &["bogus=1"], &sel, Arc::new(NullEvents))
      .unwrap_err();
    assert_eq!(err, Error::InvalidArgument);
  }

  #[test]
  fn unknown_accepter_argument_is_rejected() {
    let sel = Selector::new().unwrap();
    let err =
      new_accepter(&loopback(), &["laddr=127.0.0.1:0"], &sel, Arc::new(NullAccEvents))
        .unwrap_err();
    assert_eq!(err, Error::InvalidArgument);
  }

  #[test]
  fn stream_arguments_parse() {
    let (size, nodelay, local) =
      parse_stream_args(&["readbuf=4096", "nodelay", "laddr=127.0.0.1:0"])
        .unwrap();
    assert_eq!(size, 4096);
    assert!(nodelay);
    assert_eq!(local.unwrap().len(), 1);

    let (size, nodelay, local) = parse_stream_args(&[]).unwrap();
    assert_eq!(size, DEFAULT_READ_BUF_SIZE);
    assert!(!nodelay);
    assert!(local.is_none());
  }

  #[test]
  fn oversized_address_entry_fails_with_too_big() {
    let sel = Selector::new().unwrap();
    // SAFETY: deliberately lies about the length to model a resolver
    // entry larger than sockaddr_storage; only the length is read.
    let oversized = unsafe {
      SockAddr::new(
        std::mem::zeroed(),
        (std::mem::size_of::<libc::sockaddr_storage>() + 16)
          as libc::socklen_t,
      )
    };
    let addrs = AddrList::from_entries(vec![oversized]).unwrap();
    let err =
      new_stream(&addrs, &[], &sel, Arc::new(NullEvents)).unwrap_err();
    assert_eq!(err, Error::TooBig);
    let err =
      new_accepter(&addrs, &[], &sel, Arc::new(NullAccEvents)).unwrap_err();
    assert_eq!(err, Error::TooBig);
  }

  #[test]
  fn unknown_aux_tag_aborts_before_sending() {
    assert_eq!(
      tcp_write(-1, b"payload", &["compress"]).unwrap_err(),
      Error::InvalidArgument
    );
  }
}
