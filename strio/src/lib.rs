#![deny(
  clippy::undocumented_unsafe_blocks,
  clippy::unnecessary_safety_comment,
  clippy::not_unsafe_ptr_arg_deref
)]

//! # strio — stream I/O abstraction with a TCP transport
//!
//! strio is a small non-blocking stream-I/O library built around a
//! registered-fd reactor. Endpoints are byte streams with an
//! open/close lifecycle and a string-keyed control surface; accepters
//! produce new inbound endpoints. The TCP transport provides both:
//!
//! - [`tcp::new_stream`] / [`tcp::stream_from_str`] build client
//!   endpoints that walk a resolved candidate list with error
//!   fall-through;
//! - [`tcp::new_accepter`] / [`tcp::accepter_from_str`] bind one or
//!   more listen sockets and hand each accepted connection upward as a
//!   new endpoint.
//!
//! All readiness dispatch happens from [`Selector::service`]; the
//! application decides where and how often its event loop runs.
//!
//! ### Example
//!
//! ```no_run
//! use std::sync::{mpsc, Arc};
//! use strio::{Selector, StreamEvents};
//!
//! struct Printer;
//!
//! impl StreamEvents for Printer {
//!   fn read(&self, data: strio::Result<&[u8]>, aux: &[&str]) {
//!     if let Ok(bytes) = data {
//!       println!("got {} bytes (aux {:?})", bytes.len(), aux);
//!     }
//!   }
//! }
//!
//! let sel = Selector::new().unwrap();
//! let stream =
//!   strio::tcp::stream_from_str("127.0.0.1:4000", &[], &sel, Arc::new(Printer))
//!     .unwrap();
//!
//! let (tx, rx) = mpsc::channel();
//! stream.open(move |res| tx.send(res).unwrap()).unwrap();
//! while rx.try_recv().is_err() {
//!   sel.service(None).unwrap();
//! }
//! ```

#[macro_use]
mod macros;
mod sync;

pub mod accepter;
pub mod addr;
pub mod args;
pub mod error;
pub mod fdio;
pub mod selector;
mod sockops;
pub mod stream;
pub mod tcp;

pub use accepter::{Accepter, AccepterEvents, AccepterOps, LogLevel};
pub use addr::AddrList;
pub use error::{Error, Result};
pub use fdio::DEFAULT_READ_BUF_SIZE;
pub use selector::Selector;
pub use stream::{Stream, StreamEvents};
