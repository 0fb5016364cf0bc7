//! Registered-fd readiness reactor.
//!
//! The [`Selector`] owns an epoll instance and a table of registered
//! fds, each with an [`FdHandler`] and independently enabled
//! read/write/except interest slots. All dispatch happens from
//! [`Selector::service`], which the application calls wherever it
//! wants its event loop to live.
//!
//! Handler removal is asynchronous: [`Selector::clear_fd_handlers`]
//! stops event delivery immediately but the fd's
//! [`FdHandler::cleared`] acknowledgement only fires from a service
//! pass, after any in-flight callback for that fd has returned. That
//! acknowledgement is the only point at which closing the fd is safe.
//!
//! TODO: kqueue variant for the BSDs.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::sync::Mutex;

/// Reserved event key for the wakeup eventfd.
const WAKE_KEY: u64 = u64::MAX;

/// Per-fd callbacks dispatched by [`Selector::service`].
///
/// A given fd's callbacks are never re-entered concurrently with
/// themselves. `cleared` fires exactly once per
/// [`Selector::clear_fd_handlers`] request.
pub trait FdHandler: Send + Sync {
  fn read_ready(&self, _fd: RawFd) {}
  fn write_ready(&self, _fd: RawFd) {}
  fn except_ready(&self, _fd: RawFd) {}
  fn cleared(&self, _fd: RawFd) {}
}

struct FdEntry {
  handler: Arc<dyn FdHandler>,
  read: bool,
  write: bool,
  except: bool,
  clearing: bool,
}

impl FdEntry {
  fn interest(&self) -> u32 {
    let mut events = 0u32;
    if self.read {
      events |= libc::EPOLLIN as u32;
    }
    if self.write {
      events |= libc::EPOLLOUT as u32;
    }
    if self.except {
      events |= libc::EPOLLPRI as u32;
    }
    events
  }
}

struct Inner {
  epoll: OwnedFd,
  wake: OwnedFd,
  fds: Mutex<HashMap<RawFd, FdEntry>>,
  deferred: Mutex<VecDeque<Box<dyn FnOnce() + Send>>>,
  service_lock: Mutex<()>,
}

/// Handle to the reactor. Clones share one instance.
///
/// The application owns the event loop: nothing happens until
/// [`Selector::service`] runs, and everything — readiness callbacks,
/// deferred work, clear acknowledgements — happens inside it. That
/// keeps dispatch single-threaded without the reactor owning a thread.
///
/// # Examples
///
/// ```rust,no_run
/// use std::time::Duration;
/// use strio::Selector;
///
/// let sel = Selector::new().unwrap();
/// loop {
///   // Dispatch whatever became ready, waiting up to ten
///   // milliseconds for something to happen.
///   sel.service(Some(Duration::from_millis(10))).unwrap();
/// }
/// ```
#[derive(Clone)]
pub struct Selector {
  inner: Arc<Inner>,
}

impl Selector {
  pub fn new() -> io::Result<Selector> {
    let epoll = {
      let fd = syscall!(epoll_create1(libc::EPOLL_CLOEXEC))?;
      // SAFETY: freshly created fd, exclusively owned here.
      unsafe { OwnedFd::from_raw_fd(fd) }
    };
    let wake = {
      let fd = syscall!(eventfd(0, libc::EFD_CLOEXEC | libc::EFD_NONBLOCK))?;
      // SAFETY: freshly created fd, exclusively owned here.
      unsafe { OwnedFd::from_raw_fd(fd) }
    };

    let mut event = libc::epoll_event {
      events: libc::EPOLLIN as u32,
      u64: WAKE_KEY,
    };
    syscall!(epoll_ctl(
      epoll.as_raw_fd(),
      libc::EPOLL_CTL_ADD,
      wake.as_raw_fd(),
      &mut event
    ))?;

    Ok(Selector {
      inner: Arc::new(Inner {
        epoll,
        wake,
        fds: Mutex::new(HashMap::new()),
        deferred: Mutex::new(VecDeque::new()),
        service_lock: Mutex::new(()),
      }),
    })
  }

  /// Registers `handler` for `fd`. All interest slots start disabled.
  pub fn set_fd_handlers(
    &self,
    fd: RawFd,
    handler: Arc<dyn FdHandler>,
  ) -> Result<()> {
    let mut fds = self.inner.fds.lock();
    if fds.contains_key(&fd) {
      return Err(Error::Busy);
    }
    let entry = FdEntry {
      handler,
      read: false,
      write: false,
      except: false,
      clearing: false,
    };
    let mut event = libc::epoll_event {
      events: entry.interest(),
      u64: fd as u64,
    };
    syscall!(epoll_ctl(
      self.inner.epoll.as_raw_fd(),
      libc::EPOLL_CTL_ADD,
      fd,
      &mut event
    ))
    .map_err(Error::from)?;
    fds.insert(fd, entry);
    Ok(())
  }

  fn set_slot(&self, fd: RawFd, enable: bool, slot: fn(&mut FdEntry) -> &mut bool) {
    let mut fds = self.inner.fds.lock();
    let entry = match fds.get_mut(&fd) {
      Some(e) if !e.clearing => e,
      _ => return,
    };
    if *slot(entry) == enable {
      return;
    }
    *slot(entry) = enable;
    let mut event = libc::epoll_event {
      events: entry.interest(),
      u64: fd as u64,
    };
    let _ = syscall!(epoll_ctl(
      self.inner.epoll.as_raw_fd(),
      libc::EPOLL_CTL_MOD,
      fd,
      &mut event
    ));
  }

  pub fn set_read_handler(&self, fd: RawFd, enable: bool) {
    self.set_slot(fd, enable, |e| &mut e.read)
  }

  pub fn set_write_handler(&self, fd: RawFd, enable: bool) {
    self.set_slot(fd, enable, |e| &mut e.write)
  }

  pub fn set_except_handler(&self, fd: RawFd, enable: bool) {
    self.set_slot(fd, enable, |e| &mut e.except)
  }

  /// Requests removal of `fd`'s handlers. Event delivery stops
  /// immediately; [`FdHandler::cleared`] fires from a later service
  /// pass as the acknowledgement.
  pub fn clear_fd_handlers(&self, fd: RawFd) {
    {
      let mut fds = self.inner.fds.lock();
      if let Some(entry) = fds.get_mut(&fd) {
        if !entry.clearing {
          entry.clearing = true;
          let _ = syscall!(epoll_ctl(
            self.inner.epoll.as_raw_fd(),
            libc::EPOLL_CTL_DEL,
            fd,
            std::ptr::null_mut()
          ));
        }
      }
    }
    self.wake();
  }

  /// Synchronous removal with no `cleared` acknowledgement. Only legal
  /// when the caller knows no callback for `fd` can be in flight.
  pub fn clear_fd_handlers_norpt(&self, fd: RawFd) {
    let mut fds = self.inner.fds.lock();
    if fds.remove(&fd).is_some() {
      let _ = syscall!(epoll_ctl(
        self.inner.epoll.as_raw_fd(),
        libc::EPOLL_CTL_DEL,
        fd,
        std::ptr::null_mut()
      ));
    }
  }

  /// Queues `f` to run at the start of the next service pass.
  pub fn defer(&self, f: impl FnOnce() + Send + 'static) {
    self.inner.deferred.lock().push_back(Box::new(f));
    self.wake();
  }

  /// Wakes a `service` call blocked in the kernel.
  pub fn wake(&self) {
    let buf: [u8; 8] = 1u64.to_ne_bytes();
    let _ = syscall!(write(
      self.inner.wake.as_raw_fd(),
      buf.as_ptr().cast::<libc::c_void>(),
      buf.len()
    ));
  }

  /// Runs one dispatch pass: deferred work first, then readiness
  /// callbacks, then pending handler-clear acknowledgements.
  ///
  /// `timeout` bounds the kernel wait; `None` blocks until something
  /// becomes ready or [`Selector::wake`] is called. Returns the number
  /// of items dispatched. Concurrent callers are serialized; callbacks
  /// only ever run on the thread currently inside `service`.
  pub fn service(&self, timeout: Option<Duration>) -> io::Result<usize> {
    let _guard = self.inner.service_lock.lock();
    let mut dispatched = 0;

    loop {
      let job = self.inner.deferred.lock().pop_front();
      match job {
        Some(job) => {
          job();
          dispatched += 1;
        }
        None => break,
      }
    }

    let timeout_ms = match timeout {
      Some(t) => t.as_millis().min(i32::MAX as u128) as i32,
      None => -1,
    };
    let mut events = [libc::epoll_event { events: 0, u64: 0 }; 64];
    let n = syscall!(retry epoll_wait(
      self.inner.epoll.as_raw_fd(),
      events.as_mut_ptr(),
      events.len() as i32,
      timeout_ms
    ))? as usize;

    for event in &events[..n] {
      if event.u64 == WAKE_KEY {
        self.drain_wake();
        continue;
      }
      let fd = event.u64 as RawFd;
      let (handler, read, write, except) = {
        let fds = self.inner.fds.lock();
        match fds.get(&fd) {
          Some(e) if !e.clearing => (e.handler.clone(), e.read, e.write, e.except),
          _ => continue,
        }
      };
      let bits = event.events;
      let err = bits & (libc::EPOLLERR as u32 | libc::EPOLLHUP as u32) != 0;
      if except && bits & libc::EPOLLPRI as u32 != 0 {
        handler.except_ready(fd);
        dispatched += 1;
      }
      if read && (bits & libc::EPOLLIN as u32 != 0 || err) {
        handler.read_ready(fd);
        dispatched += 1;
      }
      if write && (bits & libc::EPOLLOUT as u32 != 0 || err) {
        handler.write_ready(fd);
        dispatched += 1;
      }
    }

    // Acknowledge clears only once every callback above has returned.
    let cleared: Vec<(RawFd, Arc<dyn FdHandler>)> = {
      let mut fds = self.inner.fds.lock();
      let keys: Vec<RawFd> = fds
        .iter()
        .filter(|(_, e)| e.clearing)
        .map(|(fd, _)| *fd)
        .collect();
      keys
        .into_iter()
        .filter_map(|fd| fds.remove(&fd).map(|e| (fd, e.handler)))
        .collect()
    };
    for (fd, handler) in cleared {
      handler.cleared(fd);
      dispatched += 1;
    }

    Ok(dispatched)
  }

  fn drain_wake(&self) {
    let mut buf = [0u8; 8];
    let _ = syscall!(read(
      self.inner.wake.as_raw_fd(),
      buf.as_mut_ptr().cast::<libc::c_void>(),
      buf.len()
    ));
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::mpsc;

  struct Recorder {
    tx: mpsc::Sender<&'static str>,
  }

  impl FdHandler for Recorder {
    fn read_ready(&self, _fd: RawFd) {
      let _ = self.tx.send("read");
    }

    fn cleared(&self, _fd: RawFd) {
      let _ = self.tx.send("cleared");
    }
  }

  #[test]
  fn deferred_jobs_run_on_service() {
    let sel = Selector::new().unwrap();
    let (tx, rx) = mpsc::channel();
    sel.defer(move || tx.send(()).unwrap());
    sel.service(Some(Duration::from_millis(10))).unwrap();
    rx.try_recv().unwrap();
  }

  #[test]
  fn read_dispatch_then_clear_ack() {
    let sel = Selector::new().unwrap();
    let (tx, rx) = mpsc::channel();
    let fd = syscall!(eventfd(1, libc::EFD_CLOEXEC)).unwrap();

    sel.set_fd_handlers(fd, Arc::new(Recorder { tx })).unwrap();
    sel.set_read_handler(fd, true);
    sel.service(Some(Duration::from_millis(50))).unwrap();
    assert_eq!(rx.try_recv().unwrap(), "read");

    sel.clear_fd_handlers(fd);
    sel.service(Some(Duration::from_millis(50))).unwrap();
    assert!(rx.try_iter().any(|m| m == "cleared"));
    crate::sockops::close_fd(fd);
  }

  #[test]
  fn registering_the_same_fd_twice_is_refused() {
    let sel = Selector::new().unwrap();
    let (tx, _rx) = mpsc::channel();
    let fd = syscall!(eventfd(0, libc::EFD_CLOEXEC)).unwrap();

    sel
      .set_fd_handlers(fd, Arc::new(Recorder { tx: tx.clone() }))
      .unwrap();
    assert_eq!(
      sel.set_fd_handlers(fd, Arc::new(Recorder { tx })).unwrap_err(),
      Error::Busy
    );
    sel.clear_fd_handlers_norpt(fd);
    crate::sockops::close_fd(fd);
  }
}
