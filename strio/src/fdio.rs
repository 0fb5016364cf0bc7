//! The fd I/O framework.
//!
//! An [`FdIo`] owns one registered fd and its open/close lifecycle.
//! Transports plug in through [`FdOps`]: client endpoints implement
//! the three open hooks and the framework drives the connect-retry
//! cycle (register for writability, validate with `check_open`, clear
//! the failed fd, `retry_open` on the next candidate); server
//! endpoints arrive with a connected fd and leave the open hooks at
//! their defaults. Inbound data and out-of-line records flow upward
//! through [`FdIoEvents`].

use std::os::fd::RawFd;
use std::sync::{Arc, Weak};

use crate::error::{Error, Result};
use crate::selector::{FdHandler, Selector};
use crate::sockops;
use crate::sync::Mutex;

/// Default read-buffer size for endpoints that don't override
/// `readbuf`.
pub const DEFAULT_READ_BUF_SIZE: usize = 1024;

/// Outcome of one connect attempt.
pub enum OpenProgress {
  /// Peer connected synchronously.
  Ready(RawFd),
  /// Non-blocking connect is pending; wait for writability.
  InProgress(RawFd),
}

/// Out-of-line data handed up by [`FdOps::except_ready`], with the aux
/// tags to attach to the record.
pub struct ExceptData {
  pub data: Vec<u8>,
  pub aux: &'static [&'static str],
}

/// Operations a transport plugs into the framework.
///
/// Client endpoints implement the three open hooks; server-side
/// endpoints leave them at their defaults because their fd arrives
/// already connected.
pub trait FdOps: Send + Sync {
  /// Starts the first connect attempt.
  fn sub_open(&self) -> Result<OpenProgress> {
    Err(Error::Unsupported)
  }

  /// Validates an in-progress fd once it turns writable.
  fn check_open(&self, _fd: RawFd) -> Result<()> {
    Ok(())
  }

  /// Starts the next attempt after `check_open` reported an error.
  fn retry_open(&self) -> Result<OpenProgress> {
    Err(Error::Unsupported)
  }

  fn write(&self, fd: RawFd, buf: &[u8], aux: &[&str]) -> Result<usize>;

  /// Called on exception readiness; returns a record to deliver, if
  /// any.
  fn except_ready(&self, _fd: RawFd) -> Result<Option<ExceptData>> {
    Ok(None)
  }

  fn raddr_to_str(&self) -> Result<String>;

  fn get_raddr(&self, buf: &mut [u8]) -> Result<usize>;

  fn control(
    &self,
    fd: RawFd,
    get: bool,
    option: &str,
    data: &mut String,
  ) -> Result<()>;
}

/// Receiver of records coming off an fd.
pub trait FdIoEvents: Send + Sync {
  /// `Ok` carries a data record (empty meaning end-of-stream); `aux`
  /// tags out-of-line records.
  fn read(&self, data: Result<&[u8]>, aux: &[&str]);
}

type OpenDone = Box<dyn FnOnce(Result<()>) + Send>;
type CloseDone = Box<dyn FnOnce() + Send>;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Mode {
  Closed,
  /// Waiting for a pending connect to turn writable.
  InOpen,
  /// A failed attempt's fd is being cleared before the next candidate.
  InOpenClear,
  Open,
  /// Handlers are being cleared ahead of the final close.
  InClose,
}

struct State {
  mode: Mode,
  fd: RawFd, // -1 when none
  read_enabled: bool,
  open_done: Option<OpenDone>,
  close_done: Option<CloseDone>,
  // Weak so the endpoint handle above controls its own lifetime; see
  // `FdIo::set_events`.
  events: Option<Weak<dyn FdIoEvents>>,
}

struct Inner {
  weak: Weak<Inner>,
  sel: Selector,
  ops: Box<dyn FdOps>,
  max_read_size: usize,
  preconnected: bool,
  state: Mutex<State>,
}

/// One registered fd and its lifecycle.
#[derive(Clone)]
pub struct FdIo {
  inner: Arc<Inner>,
}

impl FdIo {
  /// `fd` supplies an already-connected socket (server side); `None`
  /// means the transport's open hooks produce one.
  pub fn new(
    sel: &Selector,
    fd: Option<RawFd>,
    ops: Box<dyn FdOps>,
    max_read_size: usize,
  ) -> FdIo {
    let inner = Arc::new_cyclic(|weak| Inner {
      weak: weak.clone(),
      sel: sel.clone(),
      ops,
      max_read_size,
      preconnected: fd.is_some(),
      state: Mutex::new(State {
        mode: Mode::Closed,
        fd: fd.unwrap_or(-1),
        read_enabled: false,
        open_done: None,
        close_done: None,
        events: None,
      }),
    });
    FdIo { inner }
  }

  /// Sets the upward record receiver. Only a weak link is kept: the
  /// framework never extends the receiver's lifetime, so dropping the
  /// endpoint that owns it tears the fd down rather than leaking it.
  pub fn set_events(&self, events: &Arc<dyn FdIoEvents>) {
    self.inner.state.lock().events = Some(Arc::downgrade(events));
  }

  /// Starts the open sequence. `done` fires from a service pass (or
  /// once a pending connect resolves); synchronous failures are
  /// returned directly and `done` is dropped unfired.
  pub fn open(&self, done: impl FnOnce(Result<()>) + Send + 'static) -> Result<()> {
    let mut st = self.inner.state.lock();
    if st.mode != Mode::Closed {
      return Err(Error::Busy);
    }

    if self.inner.preconnected {
      let fd = st.fd;
      self.inner.register(fd)?;
      st.mode = Mode::Open;
      self.inner.sel.set_except_handler(fd, true);
      if st.read_enabled {
        self.inner.sel.set_read_handler(fd, true);
      }
      let done: OpenDone = Box::new(done);
      self.inner.sel.defer(move || done(Ok(())));
      return Ok(());
    }

    match self.inner.ops.sub_open()? {
      OpenProgress::Ready(fd) => {
        if let Err(err) = self.inner.register(fd) {
          sockops::close_fd(fd);
          return Err(err);
        }
        st.fd = fd;
        st.mode = Mode::Open;
        self.inner.sel.set_except_handler(fd, true);
        if st.read_enabled {
          self.inner.sel.set_read_handler(fd, true);
        }
        let done: OpenDone = Box::new(done);
        self.inner.sel.defer(move || done(Ok(())));
        Ok(())
      }
      OpenProgress::InProgress(fd) => {
        if let Err(err) = self.inner.register(fd) {
          sockops::close_fd(fd);
          return Err(err);
        }
        st.fd = fd;
        st.mode = Mode::InOpen;
        st.open_done = Some(Box::new(done));
        self.inner.sel.set_write_handler(fd, true);
        self.inner.sel.set_except_handler(fd, true);
        Ok(())
      }
    }
  }

  /// Begins teardown; `done` fires after the framework acknowledges
  /// the handler-clear and the fd is closed.
  pub fn close(&self, done: impl FnOnce() + Send + 'static) -> Result<()> {
    let mut st = self.inner.state.lock();
    match st.mode {
      Mode::Open | Mode::InOpen => {
        let fd = st.fd;
        st.mode = Mode::InClose;
        st.close_done = Some(Box::new(done));
        st.open_done = None;
        drop(st);
        self.inner.sel.clear_fd_handlers(fd);
        Ok(())
      }
      Mode::InOpenClear => {
        st.mode = Mode::InClose;
        st.close_done = Some(Box::new(done));
        st.open_done = None;
        Ok(())
      }
      Mode::Closed | Mode::InClose => Err(Error::Busy),
    }
  }

  pub fn set_read_callback_enable(&self, enable: bool) {
    let mut st = self.inner.state.lock();
    st.read_enabled = enable;
    if st.mode == Mode::Open && st.fd >= 0 {
      self.inner.sel.set_read_handler(st.fd, enable);
    }
  }

  pub fn write(&self, buf: &[u8], aux: &[&str]) -> Result<usize> {
    let fd = self.open_fd()?;
    self.inner.ops.write(fd, buf, aux)
  }

  pub fn control(&self, get: bool, option: &str, data: &mut String) -> Result<()> {
    let fd = self.open_fd()?;
    self.inner.ops.control(fd, get, option, data)
  }

  pub fn raddr_to_str(&self) -> Result<String> {
    self.inner.ops.raddr_to_str()
  }

  pub fn get_raddr(&self, buf: &mut [u8]) -> Result<usize> {
    self.inner.ops.get_raddr(buf)
  }

  fn open_fd(&self) -> Result<RawFd> {
    let st = self.inner.state.lock();
    if st.mode != Mode::Open {
      return Err(Error::Busy);
    }
    Ok(st.fd)
  }
}

impl Inner {
  fn register(&self, fd: RawFd) -> Result<()> {
    let me = match self.weak.upgrade() {
      Some(me) => me,
      None => return Err(Error::Busy),
    };
    self.sel.set_fd_handlers(fd, me)
  }

  fn finish_open(&self, st: &mut State, fd: RawFd) -> Option<OpenDone> {
    st.mode = Mode::Open;
    self.sel.set_write_handler(fd, false);
    if st.read_enabled {
      self.sel.set_read_handler(fd, true);
    }
    st.open_done.take()
  }
}

impl FdHandler for Inner {
  fn write_ready(&self, fd: RawFd) {
    let mut st = self.state.lock();
    if st.mode != Mode::InOpen || st.fd != fd {
      return;
    }
    match self.ops.check_open(fd) {
      Ok(()) => {
        let done = self.finish_open(&mut st, fd);
        drop(st);
        if let Some(done) = done {
          done(Ok(()));
        }
      }
      Err(_) => {
        st.mode = Mode::InOpenClear;
        drop(st);
        self.sel.clear_fd_handlers(fd);
      }
    }
  }

  fn read_ready(&self, fd: RawFd) {
    let events = {
      let st = self.state.lock();
      if st.mode != Mode::Open || !st.read_enabled || st.fd != fd {
        return;
      }
      match st.events.as_ref().and_then(Weak::upgrade) {
        Some(ev) => ev,
        None => return,
      }
    };
    let mut buf = vec![0u8; self.max_read_size];
    match sockops::os_recv(fd, &mut buf, 0) {
      Ok(n) => events.read(Ok(&buf[..n]), &[]),
      Err(err) if err.is_would_block() => {}
      Err(err) => events.read(Err(err), &[]),
    }
  }

  fn except_ready(&self, fd: RawFd) {
    let events = {
      let st = self.state.lock();
      if st.mode != Mode::Open || st.fd != fd {
        return;
      }
      match st.events.as_ref().and_then(Weak::upgrade) {
        Some(ev) => ev,
        None => return,
      }
    };
    match self.ops.except_ready(fd) {
      Ok(Some(rec)) => events.read(Ok(&rec.data), rec.aux),
      Ok(None) => {}
      Err(err) if err.is_would_block() => {}
      Err(err) => events.read(Err(err), &[]),
    }
  }

  fn cleared(&self, fd: RawFd) {
    let mut st = self.state.lock();
    if st.fd == fd {
      sockops::close_fd(fd);
      st.fd = -1;
    }
    match st.mode {
      Mode::InOpenClear => match self.ops.retry_open() {
        Ok(OpenProgress::InProgress(nfd)) => {
          if let Err(err) = self.register(nfd) {
            sockops::close_fd(nfd);
            st.mode = Mode::Closed;
            let done = st.open_done.take();
            drop(st);
            if let Some(done) = done {
              done(Err(err));
            }
            return;
          }
          st.fd = nfd;
          st.mode = Mode::InOpen;
          self.sel.set_write_handler(nfd, true);
          self.sel.set_except_handler(nfd, true);
        }
        Ok(OpenProgress::Ready(nfd)) => {
          if let Err(err) = self.register(nfd) {
            sockops::close_fd(nfd);
            st.mode = Mode::Closed;
            let done = st.open_done.take();
            drop(st);
            if let Some(done) = done {
              done(Err(err));
            }
            return;
          }
          st.fd = nfd;
          let done = self.finish_open(&mut st, nfd);
          self.sel.set_except_handler(nfd, true);
          drop(st);
          if let Some(done) = done {
            done(Ok(()));
          }
        }
        Err(err) => {
          st.mode = Mode::Closed;
          let done = st.open_done.take();
          drop(st);
          if let Some(done) = done {
            done(Err(err));
          }
        }
      },
      Mode::InClose => {
        st.mode = Mode::Closed;
        let done = st.close_done.take();
        drop(st);
        if let Some(done) = done {
          done();
        }
      }
      _ => {}
    }
  }
}

impl Drop for Inner {
  fn drop(&mut self) {
    // The reactor holds a strong reference for as long as the fd is
    // registered, so by the time this runs no registration is left;
    // only a never-registered fd (or one already released through
    // `cleared`) can still be here.
    let st = self.state.lock();
    if st.fd >= 0 {
      sockops::close_fd(st.fd);
    }
  }
}
