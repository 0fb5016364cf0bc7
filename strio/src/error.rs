//! Library error type.

use std::io;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by endpoint construction and I/O operations.
///
/// OS-level failures ride in [`Error::Os`] verbatim so they survive
/// logging and test assertions without loss.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
  /// Malformed or unknown argument key, unrecognized aux tag, or an
  /// address that cannot be used for the requested endpoint.
  #[error("invalid argument")]
  InvalidArgument,

  /// An address entry exceeds the platform's sockaddr storage.
  #[error("address larger than sockaddr storage")]
  TooBig,

  /// Allocation failure.
  #[error("out of memory")]
  OutOfMemory,

  /// Lifecycle operation invoked in the wrong state.
  #[error("resource busy")]
  Busy,

  /// Unknown control or unsupported operation.
  #[error("operation not supported")]
  Unsupported,

  /// Raw OS error, preserved from the failing syscall.
  #[error("os error {0}")]
  Os(i32),
}

impl Error {
  /// True for the EAGAIN/EWOULDBLOCK family.
  pub fn is_would_block(&self) -> bool {
    matches!(self, Error::Os(code)
      if *code == libc::EAGAIN || *code == libc::EWOULDBLOCK)
  }

  /// The raw errno value, if this is an OS error.
  pub fn os_error(&self) -> Option<i32> {
    match self {
      Error::Os(code) => Some(*code),
      _ => None,
    }
  }
}

impl From<io::Error> for Error {
  fn from(err: io::Error) -> Error {
    match err.raw_os_error() {
      Some(code) => Error::Os(code),
      None if err.kind() == io::ErrorKind::InvalidInput => {
        Error::InvalidArgument
      }
      None => Error::Os(libc::EIO),
    }
  }
}
