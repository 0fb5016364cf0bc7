//! Public accepter surface and its upward event interface.
//!
//! An [`Accepter`] owns a set of listening sockets and produces new
//! inbound [`Stream`]s through [`AccepterEvents::new_connection`].
//! Its lifecycle is asymmetric by design: `startup` is synchronous and
//! all-or-nothing, while `shutdown` is asynchronous because the
//! reactor must acknowledge the handler-clear on every listen fd
//! before the fds may be closed. `disable` is the forceful synchronous
//! escape hatch for callers who know no callback can be in flight.

use std::os::fd::RawFd;
use std::sync::Arc;

use crate::addr::AddrList;
use crate::error::Result;
use crate::stream::{Stream, StreamEvents};
use crate::sync::Mutex;

/// Severity for accepter log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
  Err,
  Warning,
  Info,
  Debug,
}

/// Application-side callbacks for an accepter.
///
/// Only `new_connection` is required. `log` receives operational
/// messages the accepter cannot report through a return value (they
/// happen inside the accept handler); `check_connection` is a
/// host-access hook consulted before any per-connection setup.
///
/// # Examples
///
/// Forward accepted connections into a channel:
///
/// ```rust
/// use std::sync::mpsc;
/// use strio::{AccepterEvents, Stream};
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
/// ```
pub trait AccepterEvents: Send + Sync {
  /// A server endpoint finished its open sequence.
  ///
  /// The stream arrives open and reliable, with no [`StreamEvents`]
  /// attached and its read callback disabled. Dropping it here closes
  /// the connection.
  fn new_connection(&self, stream: Stream);

  /// Operational log messages. Accept and setup failures land here at
  /// [`LogLevel::Err`].
  fn log(&self, _level: LogLevel, _msg: &str) {}

  /// Host-access hook run against every accepted fd before any setup.
  /// A returned string denies the connection and is written back to
  /// the peer verbatim.
  fn check_connection(&self, _fd: RawFd) -> Option<String> {
    None
  }
}

/// Operations an accepter transport provides.
///
/// Dropping the public handle acts as free: a still-running accepter
/// is shut down with no completion notification.
pub trait AccepterOps: Send + Sync {
  fn startup(&self) -> Result<()>;
  fn shutdown(&self, done: Box<dyn FnOnce() + Send>) -> Result<()>;
  fn set_accept_callback_enable(&self, enable: bool);
  fn disable(&self);
  fn local_addr(&self) -> Result<AddrList>;
  fn str_to_stream(
    &self,
    addr: &str,
    events: Arc<dyn StreamEvents>,
  ) -> Result<Stream>;
  fn free(&self);
}

/// A listener producing new inbound endpoints.
///
/// # Examples
///
/// Bind an ephemeral port, report it, and serve forever:
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
/// let (tx, rx) = mpsc::channel();
/// let acc = strio::tcp::accepter_from_str(
///   "127.0.0.1:0",
///   &[],
///   &sel,
///   Arc::new(OnConnection { tx }),
/// )
/// .unwrap();
///
/// acc.startup().unwrap();
/// let port = acc.local_addr().unwrap().socket_addrs()[0].port();
/// println!("listening on port {port}");
///
/// loop {
///   sel.service(None).unwrap();
///   while let Ok(stream) = rx.try_recv() {
///     println!("connection from {}", stream.remote_addr_str().unwrap());
///   }
/// }
/// ```
pub struct Accepter {
  ops: Arc<dyn AccepterOps>,
}

impl std::fmt::Debug for Accepter {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Accepter").finish()
  }
}

impl Accepter {
  pub(crate) fn new(ops: Arc<dyn AccepterOps>) -> Accepter {
    Accepter { ops }
  }

  /// Binds and starts accepting. All listen sockets open or none do.
  ///
  /// Fails with [`Error::Busy`](crate::Error::Busy) while the accepter
  /// is already running or a previous shutdown has not completed.
  pub fn startup(&self) -> Result<()> {
    self.ops.startup()
  }

  /// Asynchronous shutdown; `done` fires exactly once, after every
  /// listen fd's handler-clear has been acknowledged and the fd
  /// closed. An accept handler that already started runs to
  /// completion, but no new one fires after this returns.
  ///
  /// Fails with [`Error::Busy`](crate::Error::Busy) when the accepter
  /// is not running.
  pub fn shutdown(&self, done: impl FnOnce() + Send + 'static) -> Result<()> {
    self.ops.shutdown(Box::new(done))
  }

  /// Pauses or resumes accept callbacks on every listen fd in
  /// lockstep. Setting the current value is a no-op. Paused
  /// connections stay in the kernel backlog and are delivered once
  /// callbacks are re-enabled.
  pub fn set_accept_callback_enable(&self, enable: bool) {
    self.ops.set_accept_callback_enable(enable)
  }

  /// Forceful synchronous teardown; no completion callback fires and
  /// the listen fds are closed before this returns. Only legal when no
  /// accepter callback can be in flight.
  pub fn disable(&self) {
    self.ops.disable()
  }

  /// Addresses actually bound; reports OS-assigned ports, which is how
  /// a port-0 bind is discovered.
  pub fn local_addr(&self) -> Result<AddrList> {
    self.ops.local_addr()
  }

  /// Builds a client endpoint from an address string, inheriting this
  /// accepter's defaults.
  ///
  /// The string may carry trailing arguments
  /// (`host:port,key=value,...`) that override the inherited values;
  /// see the transport's string constructor for the grammar.
  pub fn str_to_stream(
    &self,
    addr: &str,
    events: Arc<dyn StreamEvents>,
  ) -> Result<Stream> {
    self.ops.str_to_stream(addr, events)
  }
}

impl Drop for Accepter {
  fn drop(&mut self) {
    self.ops.free();
  }
}

/// Shared upward plumbing handed to accepter transports: event routing
/// and the pending-endpoint set.
pub(crate) struct AccCore {
  events: Arc<dyn AccepterEvents>,
  pending: Mutex<Vec<Stream>>,
}

impl AccCore {
  pub(crate) fn new(events: Arc<dyn AccepterEvents>) -> AccCore {
    AccCore { events, pending: Mutex::new(Vec::new()) }
  }

  pub(crate) fn new_connection(&self, stream: Stream) {
    self.events.new_connection(stream);
  }

  pub(crate) fn log_err(&self, msg: &str) {
    log::error!("{msg}");
    self.events.log(LogLevel::Err, msg);
  }

  pub(crate) fn check_connection(&self, fd: RawFd) -> Option<String> {
    self.events.check_connection(fd)
  }

  pub(crate) fn add_pending(&self, stream: &Stream) {
    self.pending.lock().push(stream.clone());
  }

  pub(crate) fn remove_pending(&self, stream: &Stream) {
    self.pending.lock().retain(|s| !s.same_as(stream));
  }
}
