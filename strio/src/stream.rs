//! Public byte-stream endpoint.
//!
//! A [`Stream`] wraps one fd-framework object into the application's
//! view of an endpoint: an open/close lifecycle, record writes with
//! aux tags, a pull-style read callback, a string-keyed control
//! surface, and remote-address queries. Clones of a `Stream` share the
//! endpoint; when the last clone drops, the endpoint is torn down the
//! same way an explicit [`Stream::close`] would do it, so an abandoned
//! connection never leaks its fd or its reactor registration.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::Result;
use crate::fdio::{FdIo, FdIoEvents};
use crate::sync::Mutex;

/// Receiver for records coming off a stream.
///
/// `data` is `Ok` with the record bytes (empty meaning end-of-stream)
/// or the error that ended the read side; `aux` carries record tags
/// such as `"oob"`.
///
/// # Examples
///
/// ```rust
/// use strio::StreamEvents;
///
/// struct OnRead;
///
/// impl StreamEvents for OnRead {
///   fn read(&self, data: strio::Result<&[u8]>, aux: &[&str]) {
///     match data {
///       Ok(bytes) if bytes.is_empty() => println!("peer closed"),
///       Ok(bytes) => println!("{} bytes (aux {:?})", bytes.len(), aux),
///       Err(err) => println!("read error: {err}"),
///     }
///   }
/// }
/// ```
pub trait StreamEvents: Send + Sync {
  fn read(&self, data: Result<&[u8]>, aux: &[&str]);
}

struct Inner {
  io: FdIo,
  reliable: AtomicBool,
  events: Mutex<Option<Arc<dyn StreamEvents>>>,
}

impl FdIoEvents for Inner {
  fn read(&self, data: Result<&[u8]>, aux: &[&str]) {
    let ev = self.events.lock().clone();
    if let Some(ev) = ev {
      ev.read(data, aux);
    }
  }
}

impl Drop for Inner {
  /// Last handle gone: drive the same teardown an explicit close
  /// would. A no-longer-open endpoint makes this a no-op.
  fn drop(&mut self) {
    let _ = self.io.close(|| {});
  }
}

/// A bidirectional byte-stream endpoint with an open/close lifecycle.
///
/// Client streams come from the transport constructors (for TCP,
/// [`tcp::new_stream`](crate::tcp::new_stream) and
/// [`tcp::stream_from_str`](crate::tcp::stream_from_str)) and must be
/// opened before use. Server-side streams are delivered through
/// [`AccepterEvents::new_connection`](crate::accepter::AccepterEvents)
/// already open; attach a [`StreamEvents`] with [`Stream::set_events`]
/// before enabling the read callback.
///
/// Clones share one endpoint. Dropping the last clone releases the fd
/// through the reactor's acknowledged clear path, exactly like
/// [`Stream::close`] with no completion callback.
///
/// # Examples
///
/// Connect, write a greeting, and start reading:
///
/// ```rust,no_run
/// use std::sync::{mpsc, Arc};
/// use strio::{Selector, StreamEvents};
///
/// struct OnRead;
///
/// impl StreamEvents for OnRead {
///   fn read(&self, data: strio::Result<&[u8]>, aux: &[&str]) {
///     if let Ok(bytes) = data {
///       println!("{} bytes (aux {:?})", bytes.len(), aux);
///     }
///   }
/// }
///
/// let sel = Selector::new().unwrap();
/// let stream = strio::tcp::stream_from_str(
///   "127.0.0.1:3023",
///   &["nodelay"],
///   &sel,
///   Arc::new(OnRead),
/// )
/// .unwrap();
///
/// let (tx, rx) = mpsc::channel();
/// stream.open(move |res| tx.send(res).unwrap()).unwrap();
/// while rx.try_recv().is_err() {
///   sel.service(None).unwrap();
/// }
///
/// stream.write(b"hello", &[]).unwrap();
/// stream.set_read_callback_enable(true);
/// ```
#[derive(Clone)]
pub struct Stream {
  inner: Arc<Inner>,
}

impl std::fmt::Debug for Stream {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Stream").finish()
  }
}

impl Stream {
  pub(crate) fn new(io: FdIo) -> Stream {
    let inner = Arc::new(Inner {
      io: io.clone(),
      reliable: AtomicBool::new(false),
      events: Mutex::new(None),
    });
    let events: Arc<dyn FdIoEvents> = inner.clone();
    io.set_events(&events);
    Stream { inner }
  }

  /// Sets the receiver for read records, replacing any previous one.
  ///
  /// Records only start flowing once the read callback is enabled with
  /// [`Stream::set_read_callback_enable`]; out-of-line records (such
  /// as TCP urgent data) are delivered whenever the endpoint is open.
  pub fn set_events(&self, events: Arc<dyn StreamEvents>) {
    *self.inner.events.lock() = Some(events);
  }

  /// Starts the open sequence; `done` reports the outcome.
  ///
  /// `done` fires from a reactor service pass, or once a pending
  /// connect resolves. A synchronous failure is returned directly and
  /// `done` never fires. Opening an endpoint that is not closed fails
  /// with [`Error::Busy`](crate::Error::Busy).
  pub fn open(
    &self,
    done: impl FnOnce(Result<()>) + Send + 'static,
  ) -> Result<()> {
    self.inner.io.open(done)
  }

  /// Begins teardown; `done` fires once the reactor has acknowledged
  /// the handler-clear and the fd is closed.
  pub fn close(&self, done: impl FnOnce() + Send + 'static) -> Result<()> {
    self.inner.io.close(done)
  }

  /// Writes one record, returning the number of bytes accepted.
  ///
  /// Aux tags modify the send; the TCP transport recognizes `"oob"`
  /// to mark the bytes urgent. An unrecognized tag fails with
  /// [`Error::InvalidArgument`](crate::Error::InvalidArgument) before
  /// anything is transmitted.
  pub fn write(&self, buf: &[u8], aux: &[&str]) -> Result<usize> {
    self.inner.io.write(buf, aux)
  }

  /// Enables or disables delivery of read records to the attached
  /// [`StreamEvents`].
  pub fn set_read_callback_enable(&self, enable: bool) {
    self.inner.io.set_read_callback_enable(enable);
  }

  /// Per-stream control surface; see the transport for the recognized
  /// options (TCP: `"nodelay"`).
  ///
  /// With `get` true the current value is rendered into `data`;
  /// otherwise `data` is parsed as the new value.
  pub fn control(
    &self,
    get: bool,
    option: &str,
    data: &mut String,
  ) -> Result<()> {
    self.inner.io.control(get, option, data)
  }

  /// Renders the connected peer address as text.
  pub fn remote_addr_str(&self) -> Result<String> {
    self.inner.io.raddr_to_str()
  }

  /// Copies the raw peer sockaddr bytes into `buf`, truncating to the
  /// buffer size; returns the copied length.
  pub fn remote_addr(&self, buf: &mut [u8]) -> Result<usize> {
    self.inner.io.get_raddr(buf)
  }

  /// Whether the transport guarantees ordered, lossless delivery.
  pub fn is_reliable(&self) -> bool {
    self.inner.reliable.load(Ordering::Relaxed)
  }

  pub(crate) fn set_reliable(&self, reliable: bool) {
    self.inner.reliable.store(reliable, Ordering::Relaxed);
  }

  pub(crate) fn same_as(&self, other: &Stream) -> bool {
    Arc::ptr_eq(&self.inner, &other.inner)
  }
}
