/// Wraps a libc call, mapping the negative failure return to
/// `io::Error::last_os_error()`.
///
/// The `retry` form restarts the call when it is interrupted by a
/// signal, so callers on the send/recv/wait paths don't hand-roll
/// EINTR loops.
macro_rules! syscall {
  (retry $fn:ident ( $($arg:expr),* $(,)? )) => {{
    loop {
      match syscall!($fn($($arg),*)) {
        Err(ref err) if err.raw_os_error() == Some(libc::EINTR) => continue,
        other => break other,
      }
    }
  }};
  ($fn:ident ( $($arg:expr),* $(,)? )) => {{
    #[allow(unused_unsafe, clippy::undocumented_unsafe_blocks)]
    let res = unsafe { libc::$fn($($arg),*) };
    if res < 0 {
      Err(std::io::Error::last_os_error())
    } else {
      Ok(res)
    }
  }};
}
