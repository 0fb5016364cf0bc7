use std::net::SocketAddr;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use strio::{AccepterEvents, Selector, Stream, StreamEvents};

type Record = (Result<Vec<u8>, strio::Error>, Vec<String>);

struct Collect {
  tx: mpsc::Sender<Record>,
}

impl StreamEvents for Collect {
  fn read(&self, data: strio::Result<&[u8]>, aux: &[&str]) {
    let owned = data.map(|b| b.to_vec());
    let aux = aux.iter().map(|s| s.to_string()).collect();
    let _ = self.tx.send((owned, aux));
  }
}

struct AccEvents {
  tx: mpsc::Sender<Stream>,
}

impl AccepterEvents for AccEvents {
  fn new_connection(&self, stream: Stream) {
    let _ = self.tx.send(stream);
  }
}

/// Services the reactor until `rx` yields a value.
fn poll_until<T>(sel: &Selector, rx: &mpsc::Receiver<T>) -> T {
  for _ in 0..200 {
    sel.service(Some(Duration::from_millis(10))).unwrap();
    if let Ok(value) = rx.try_recv() {
      return value;
    }
  }
  panic!("no event within the polling budget");
}

/// Accepter on an ephemeral loopback port plus its connection channel.
fn start_accepter(
  sel: &Selector,
  args: &[&str],
) -> (strio::Accepter, mpsc::Receiver<Stream>, u16) {
  let (conn_tx, conn_rx) = mpsc::channel();
  let acc = strio::tcp::accepter_from_str(
    "127.0.0.1:0",
    args,
    sel,
    Arc::new(AccEvents { tx: conn_tx }),
  )
  .unwrap();
  acc.startup().unwrap();
  let port = acc.local_addr().unwrap().socket_addrs()[0].port();
  (acc, conn_rx, port)
}

fn open_client(
  sel: &Selector,
  addr: &str,
  args: &[&str],
) -> (Stream, mpsc::Receiver<Record>) {
  let (read_tx, read_rx) = mpsc::channel();
  let client = strio::tcp::stream_from_str(
    addr,
    args,
    sel,
    Arc::new(Collect { tx: read_tx }),
  )
  .unwrap();
  let (open_tx, open_rx) = mpsc::channel();
  client.open(move |res| open_tx.send(res).unwrap()).unwrap();
  poll_until(sel, &open_rx).unwrap();
  (client, read_rx)
}

#[test]
fn accept_and_exchange_bytes() {
  let sel = Selector::new().unwrap();
  let (_acc, conn_rx, port) = start_accepter(&sel, &[]);

  let (client, _client_rx) =
    open_client(&sel, &format!("127.0.0.1:{port}"), &[]);
  assert!(client.is_reliable());
  assert_eq!(client.remote_addr_str().unwrap(), format!("127.0.0.1:{port}"));

  let server = poll_until(&sel, &conn_rx);
  assert!(server.is_reliable());

  let (srv_tx, srv_rx) = mpsc::channel();
  server.set_events(Arc::new(Collect { tx: srv_tx }));
  server.set_read_callback_enable(true);

  assert_eq!(client.write(b"hello", &[]).unwrap(), 5);
  assert_eq!(client.write(b" world", &[]).unwrap(), 6);

  // The stream may deliver the bytes in any record segmentation, but
  // the total content must arrive in order.
  let mut received = Vec::new();
  while received.len() < 11 {
    let (data, aux) = poll_until(&sel, &srv_rx);
    assert!(aux.is_empty());
    received.extend_from_slice(&data.unwrap());
  }
  assert_eq!(received, b"hello world");
}

#[test]
fn address_fallthrough_connects_to_the_live_candidate() {
  let sel = Selector::new().unwrap();
  let (_acc, conn_rx, port) = start_accepter(&sel, &[]);

  let live: SocketAddr = format!("127.0.0.1:{port}").parse().unwrap();
  let addrs = strio::AddrList::from_sockaddrs(&[
    "127.0.0.1:1".parse().unwrap(),
    live,
  ])
  .unwrap();

  let (read_tx, _read_rx) = mpsc::channel();
  let client = strio::tcp::new_stream(
    &addrs,
    &[],
    &sel,
    Arc::new(Collect { tx: read_tx }),
  )
  .unwrap();

  let (open_tx, open_rx) = mpsc::channel();
  let res = match client.open(move |res| {
    let _ = open_tx.send(res);
  }) {
    Err(err) => Err(err),
    Ok(()) => poll_until(&sel, &open_rx),
  };
  res.unwrap();

  // The cached remote address is the candidate that worked, byte for
  // byte.
  let expected = socket2::SockAddr::from(live);
  let expected_bytes = unsafe {
    std::slice::from_raw_parts(
      expected.as_ptr().cast::<u8>(),
      expected.len() as usize,
    )
  };
  let mut buf = [0u8; 128];
  let n = client.remote_addr(&mut buf).unwrap();
  assert_eq!(&buf[..n], expected_bytes);

  poll_until(&sel, &conn_rx);
}

#[test]
fn all_candidates_refused_surfaces_the_last_os_error() {
  let sel = Selector::new().unwrap();
  let addrs = strio::AddrList::from_sockaddrs(&[
    "127.0.0.1:1".parse().unwrap(),
    "127.0.0.1:2".parse().unwrap(),
  ])
  .unwrap();

  let (read_tx, _read_rx) = mpsc::channel();
  let client = strio::tcp::new_stream(
    &addrs,
    &[],
    &sel,
    Arc::new(Collect { tx: read_tx }),
  )
  .unwrap();

  let (open_tx, open_rx) = mpsc::channel();
  let res = match client.open(move |res| {
    let _ = open_tx.send(res);
  }) {
    Err(err) => Err(err),
    Ok(()) => poll_until(&sel, &open_rx),
  };
  assert_eq!(res.unwrap_err(), strio::Error::Os(libc::ECONNREFUSED));
}

#[test]
fn oob_byte_arrives_as_a_tagged_record() {
  let sel = Selector::new().unwrap();
  let (_acc, conn_rx, port) = start_accepter(&sel, &[]);

  let (client, _client_rx) =
    open_client(&sel, &format!("127.0.0.1:{port}"), &[]);
  let server = poll_until(&sel, &conn_rx);

  let (srv_tx, srv_rx) = mpsc::channel();
  server.set_events(Arc::new(Collect { tx: srv_tx }));
  server.set_read_callback_enable(true);

  assert_eq!(client.write(b"X", &["oob"]).unwrap(), 1);

  let (data, aux) = poll_until(&sel, &srv_rx);
  assert_eq!(aux, vec!["oob".to_string()]);
  assert_eq!(data.unwrap(), b"X");
}

#[test]
fn nodelay_control_round_trips() {
  let sel = Selector::new().unwrap();
  let (_acc, conn_rx, port) = start_accepter(&sel, &[]);
  let (client, _client_rx) =
    open_client(&sel, &format!("127.0.0.1:{port}"), &[]);
  poll_until(&sel, &conn_rx);

  let mut data = String::from("1");
  client.control(false, "nodelay", &mut data).unwrap();
  let mut out = String::new();
  client.control(true, "nodelay", &mut out).unwrap();
  assert_eq!(out, "1");

  let mut data = String::from("0");
  client.control(false, "nodelay", &mut data).unwrap();
  let mut out = String::new();
  client.control(true, "nodelay", &mut out).unwrap();
  assert_eq!(out, "0");

  let mut out = String::new();
  assert_eq!(
    client.control(true, "linger", &mut out).unwrap_err(),
    strio::Error::Unsupported
  );
}

#[test]
fn dropping_a_stream_endpoint_closes_the_connection() {
  let sel = Selector::new().unwrap();
  let (_acc, conn_rx, port) = start_accepter(&sel, &[]);

  // Dropping the last client handle tears its side down and the
  // server observes end-of-stream.
  let (client, _client_rx) =
    open_client(&sel, &format!("127.0.0.1:{port}"), &[]);
  let server = poll_until(&sel, &conn_rx);
  let (srv_tx, srv_rx) = mpsc::channel();
  server.set_events(Arc::new(Collect { tx: srv_tx }));
  server.set_read_callback_enable(true);

  drop(client);
  let (data, _aux) = poll_until(&sel, &srv_rx);
  assert!(data.unwrap().is_empty());

  // Same in the other direction: dropping an accepted server stream
  // closes the connection under the client.
  let (client2, client2_rx) =
    open_client(&sel, &format!("127.0.0.1:{port}"), &[]);
  client2.set_read_callback_enable(true);
  let server2 = poll_until(&sel, &conn_rx);

  drop(server2);
  let (data, _aux) = poll_until(&sel, &client2_rx);
  assert!(data.unwrap().is_empty());
}

#[test]
fn close_completes_and_the_peer_sees_eof() {
  let sel = Selector::new().unwrap();
  let (_acc, conn_rx, port) = start_accepter(&sel, &[]);
  let (client, _client_rx) =
    open_client(&sel, &format!("127.0.0.1:{port}"), &[]);
  let server = poll_until(&sel, &conn_rx);

  let (srv_tx, srv_rx) = mpsc::channel();
  server.set_events(Arc::new(Collect { tx: srv_tx }));
  server.set_read_callback_enable(true);

  let (done_tx, done_rx) = mpsc::channel();
  client.close(move || done_tx.send(()).unwrap()).unwrap();
  poll_until(&sel, &done_rx);

  // The endpoint is gone: further lifecycle calls are refused.
  assert_eq!(client.close(|| {}).unwrap_err(), strio::Error::Busy);
  assert_eq!(client.write(b"x", &[]).unwrap_err(), strio::Error::Busy);

  // The peer observes end-of-stream as an empty record.
  let (data, aux) = poll_until(&sel, &srv_rx);
  assert!(aux.is_empty());
  assert!(data.unwrap().is_empty());
}

#[test]
fn unknown_aux_tag_fails_and_sends_nothing() {
  let sel = Selector::new().unwrap();
  let (_acc, conn_rx, port) = start_accepter(&sel, &[]);
  let (client, _client_rx) =
    open_client(&sel, &format!("127.0.0.1:{port}"), &[]);
  let server = poll_until(&sel, &conn_rx);

  let (srv_tx, srv_rx) = mpsc::channel();
  server.set_events(Arc::new(Collect { tx: srv_tx }));
  server.set_read_callback_enable(true);

  assert_eq!(
    client.write(b"leak", &["compress"]).unwrap_err(),
    strio::Error::InvalidArgument
  );
  for _ in 0..20 {
    sel.service(Some(Duration::from_millis(5))).unwrap();
  }
  assert!(srv_rx.try_recv().is_err());

  // A clean write afterwards delivers exactly its own bytes.
  client.write(b"ok", &[]).unwrap();
  let (data, _aux) = poll_until(&sel, &srv_rx);
  assert_eq!(data.unwrap(), b"ok");
}
