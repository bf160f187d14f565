use greensocket::{
    Address, Family, Protocol, Socket, SocketBuilder, SocketError, SocketState, SocketType,
};
use std::io::{Read, Write};
use std::net::{Ipv4Addr, TcpListener as StdTcpListener, TcpStream as StdTcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(5);

fn listener() -> (Socket, u16) {
    let mut listener = SocketBuilder::new(Family::Inet)
        .read_timeout(TIMEOUT)
        .build()
        .expect("create listener");
    listener.listen(0, 16).expect("listen");
    let port = listener.listening_port().expect("bound port");
    (listener, port)
}

/// A port nothing listens on.
fn unused_port() -> u16 {
    let probe = StdTcpListener::bind("127.0.0.1:0").expect("bind probe");
    probe.local_addr().expect("probe addr").port()
}

#[test]
fn new_socket_is_unbound() {
    let socket = Socket::create(Family::Inet, SocketType::Stream, Protocol::Tcp).expect("create");

    assert_eq!(socket.state(), SocketState::Unbound);
    assert!(socket.descriptor() >= 0);
    assert_eq!(socket.protocol(), Protocol::Tcp);
    assert!(socket.local_address().is_none());
}

#[test]
fn listen_reports_ephemeral_port() {
    let (listener, port) = listener();

    assert!(listener.is_listening());
    assert_ne!(port, 0);
    assert_eq!(listener.local_address().and_then(Address::port), Some(port));
}

#[test]
fn accept_and_exchange_with_std_client() {
    let (listener, port) = listener();

    let client = thread::spawn(move || {
        let mut stream = StdTcpStream::connect(("127.0.0.1", port)).expect("connect");
        stream.write_all(b"ping").expect("write");
        let mut reply = [0u8; 4];
        stream.read_exact(&mut reply).expect("read_exact");
        reply
    });

    let connection = listener.accept_client_connection().expect("accept");
    assert!(connection.is_connected());
    assert_eq!(connection.remote_hostname(), "127.0.0.1");
    assert!(connection.remote_port().is_some());
    assert_eq!(connection.read_timeout(), Some(TIMEOUT));

    let mut buffer = [0u8; 4];
    let count = connection.read(&mut buffer).expect("read");
    assert_eq!(&buffer[..count], b"ping");
    connection.write_all(b"pong").expect("write_all");

    assert_eq!(&client.join().expect("client thread"), b"pong");
}

#[test]
fn connect_and_exchange_with_std_server() {
    let server = StdTcpListener::bind("127.0.0.1:0").expect("bind");
    let port = server.local_addr().expect("addr").port();

    let handle = thread::spawn(move || {
        let (mut stream, _) = server.accept().expect("accept");
        let mut request = [0u8; 5];
        stream.read_exact(&mut request).expect("read_exact");
        stream.write_all(&request).expect("echo");
    });

    let mut client = SocketBuilder::new(Family::Inet)
        .timeout(TIMEOUT)
        .build()
        .expect("create");
    client.connect("127.0.0.1", port, Some(TIMEOUT)).expect("connect");
    assert_eq!(client.state(), SocketState::Connected);
    assert_eq!(client.remote_port(), Some(port));

    client.write_all(b"hello").expect("write_all");
    let mut buffer = [0u8; 16];
    let count = client.read(&mut buffer).expect("read");
    assert_eq!(&buffer[..count], b"hello");

    handle.join().expect("server thread");
}

#[test]
fn large_payload_is_written_completely() {
    let (listener, port) = listener();
    let payload = vec![7u8; 512 * 1024];
    let expected = payload.len();

    let reader = thread::spawn(move || {
        let mut stream = StdTcpStream::connect(("127.0.0.1", port)).expect("connect");
        let mut received = Vec::new();
        stream.read_to_end(&mut received).expect("read_to_end");
        received
    });

    let connection = listener.accept_client_connection().expect("accept");
    connection.write_all(&payload).expect("write_all");
    connection.close();

    let received = reader.join().expect("reader thread");
    assert_eq!(received.len(), expected);
    assert!(received.iter().all(|&byte| byte == 7));
}

#[test]
fn peer_shutdown_reads_as_zero() {
    let (left, right) = Socket::pair(SocketType::Stream).expect("socket pair");

    drop(right);

    let mut buffer = [0u8; 8];
    assert_eq!(left.read_with_timeout(&mut buffer, Some(TIMEOUT)).expect("read"), 0);
}

#[test]
fn read_times_out_without_data() {
    let (left, _right) = Socket::pair(SocketType::Stream).expect("socket pair");
    let mut buffer = [0u8; 8];

    let started = Instant::now();
    let error = left
        .read_with_timeout(&mut buffer, Some(Duration::from_millis(50)))
        .expect_err("no data");

    assert!(matches!(error, SocketError::Timeout(Some(d)) if d == Duration::from_millis(50)));
    assert!(started.elapsed() >= Duration::from_millis(45));
}

#[test]
fn empty_read_buffer_is_rejected() {
    let (left, _right) = Socket::pair(SocketType::Stream).expect("socket pair");

    let error = left.read(&mut []).expect_err("empty buffer");

    assert!(matches!(error, SocketError::InvalidArgument(_)));
}

#[test]
fn close_is_idempotent_and_final() {
    let (left, _right) = Socket::pair(SocketType::Stream).expect("socket pair");

    left.close();
    left.close();

    assert!(left.is_closed());
    let mut buffer = [0u8; 4];
    assert!(matches!(left.read(&mut buffer), Err(SocketError::Closed)));
    assert!(matches!(left.write(b"late"), Err(SocketError::Closed)));
}

#[test]
fn huge_timeouts_block_like_no_timeout() {
    let (left, right) = Socket::pair(SocketType::Stream).expect("socket pair");

    assert_eq!(left.write_with_timeout(b"x", Some(Duration::MAX)).expect("write"), 1);

    let mut buffer = [0u8; 4];
    let count = right
        .read_with_timeout(&mut buffer, Some(Duration::MAX))
        .expect("read");
    assert_eq!(&buffer[..count], b"x");
}

#[test]
fn closed_socket_keeps_its_descriptor_until_dropped() {
    let (left, _right) = Socket::pair(SocketType::Stream).expect("socket pair");
    let descriptor = left.descriptor();

    left.close();

    // The number stays allocated, so new sockets cannot be handed it while
    // other threads may still refer to the closed one.
    let (first, second) = Socket::pair(SocketType::Stream).expect("socket pair");
    assert_ne!(first.descriptor(), descriptor);
    assert_ne!(second.descriptor(), descriptor);
    assert!(matches!(left.write(b"late"), Err(SocketError::Closed)));
}

#[test]
fn close_from_another_thread_unblocks_reader() {
    let (left, _right) = Socket::pair(SocketType::Stream).expect("socket pair");
    let left = Arc::new(left);

    let reader = {
        let left = Arc::clone(&left);
        thread::spawn(move || {
            let mut buffer = [0u8; 4];
            left.read_with_timeout(&mut buffer, Some(TIMEOUT))
        })
    };

    thread::sleep(Duration::from_millis(50));
    left.close();

    let started = Instant::now();
    let result = reader.join().expect("reader thread");
    assert!(matches!(result, Err(SocketError::Closed)));
    assert!(started.elapsed() < TIMEOUT);
}

#[test]
fn refused_connection_closes_socket() {
    let port = unused_port();
    let mut client = SocketBuilder::new(Family::Inet).build().expect("create");

    let error = client
        .connect_to(&Address::ipv4(Ipv4Addr::LOCALHOST, port), Some(TIMEOUT))
        .expect_err("nothing listens");

    assert!(matches!(error, SocketError::Connection { .. }));
    assert!(client.is_closed());
}

#[test]
fn operations_check_lifecycle_state() {
    let mut socket = SocketBuilder::new(Family::Inet).build().expect("create");

    let error = socket.accept_client_connection().expect_err("not listening");
    assert!(matches!(
        error,
        SocketError::InvalidState {
            expected: SocketState::Listening,
            actual: SocketState::Unbound
        }
    ));

    socket.listen(0, 1).expect("listen");
    assert!(matches!(socket.listen(0, 1), Err(SocketError::InvalidState { .. })));

    socket.close();
    assert!(matches!(socket.listen(0, 1), Err(SocketError::Closed)));
}

#[test]
fn binding_a_taken_port_fails() {
    let (_listener, port) = listener();
    let mut second = SocketBuilder::new(Family::Inet)
        .reuse_address(false)
        .build()
        .expect("create");

    let error = second.listen(port, 1).expect_err("port in use");

    assert!(matches!(error, SocketError::Bind { .. }));
}

#[test]
fn unix_stream_listener_round_trip() {
    let directory = tempfile::tempdir().expect("tempdir");
    let path = directory.path().join("echo.sock");
    let address = Address::unix(&path).expect("unix address");

    let mut listener = SocketBuilder::new(Family::Unix)
        .read_timeout(TIMEOUT)
        .build()
        .expect("create listener");
    listener.listen_on(&address, 4).expect("listen");
    assert!(path.exists());
    assert_eq!(listener.listening_port(), None);

    let client_path = path.clone();
    let client = thread::spawn(move || {
        let mut client = SocketBuilder::new(Family::Unix)
            .timeout(TIMEOUT)
            .build()
            .expect("create client");
        client
            .connect(client_path.to_str().expect("utf-8 path"), 0, Some(TIMEOUT))
            .expect("connect");
        client.write_all(b"over unix").expect("write_all");
        client
    });

    let connection = listener.accept_client_connection().expect("accept");
    let mut buffer = [0u8; 32];
    let count = connection.read(&mut buffer).expect("read");
    assert_eq!(&buffer[..count], b"over unix");

    drop(client.join().expect("client thread"));
    listener.close();
    assert!(!path.exists(), "bound path is unlinked on close");
}

#[test]
fn socket_pair_is_connected_both_ways() {
    let (left, right) = Socket::pair(SocketType::Stream).expect("socket pair");

    assert!(left.is_connected() && right.is_connected());
    assert_eq!(left.family(), Family::Unix);

    left.write_all(b"to right").expect("write");
    right.write_all(b"to left").expect("write");

    let mut buffer = [0u8; 16];
    let count = right.read_with_timeout(&mut buffer, Some(TIMEOUT)).expect("read");
    assert_eq!(&buffer[..count], b"to right");
    let count = left.read_with_timeout(&mut buffer, Some(TIMEOUT)).expect("read");
    assert_eq!(&buffer[..count], b"to left");
}

#[test]
fn writing_to_closed_peer_is_a_connection_error() {
    let (left, right) = Socket::pair(SocketType::Stream).expect("socket pair");
    drop(right);

    let payload = [0u8; 1024];
    let mut last = Ok(0);
    for _ in 0..64 {
        last = left.write_with_timeout(&payload, Some(TIMEOUT));
        if last.is_err() {
            break;
        }
    }

    assert!(matches!(last, Err(SocketError::Connection { .. })));
}
