use greensocket::server::echo::{BANNER, CASE_HINT};
use greensocket::{EchoServer, ServerConfig, ServerHandle, ServerState, SocketError};
use std::io::{self, Read, Write};
use std::net::TcpStream as StdTcpStream;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const TIMEOUT: Duration = Duration::from_secs(5);

fn start_server() -> (ServerHandle, u16, JoinHandle<Result<(), SocketError>>) {
    let config = ServerConfig::new()
        .port(0)
        .accept_poll_interval(Duration::from_millis(20))
        .connection_timeout(Some(TIMEOUT));

    let server = EchoServer::bind(config).expect("bind echo server");
    let port = server.local_port().expect("listening port");
    let handle = server.handle();

    let runner = thread::spawn(move || server.run());
    (handle, port, runner)
}

/// Connects and consumes the banner.
fn connect(port: u16) -> StdTcpStream {
    let mut stream = StdTcpStream::connect(("127.0.0.1", port)).expect("connect");
    stream.set_read_timeout(Some(TIMEOUT)).expect("read timeout");

    let banner = read_exactly(&mut stream, BANNER.len());
    assert_eq!(banner, BANNER);
    stream
}

fn read_exactly(stream: &mut StdTcpStream, length: usize) -> String {
    let mut buffer = vec![0u8; length];
    stream.read_exact(&mut buffer).expect("read_exact");
    String::from_utf8(buffer).expect("utf-8 reply")
}

fn send_and_expect(stream: &mut StdTcpStream, message: &str, expected: &str) {
    stream.write_all(message.as_bytes()).expect("write");
    assert_eq!(read_exactly(stream, expected.len()), expected);
}

/// True once the server has closed the connection.
fn is_closed_by_server(stream: &mut StdTcpStream) -> bool {
    let mut buffer = [0u8; 16];
    match stream.read(&mut buffer) {
        Ok(0) => true,
        Ok(_) => false,
        Err(error) => error.kind() != io::ErrorKind::WouldBlock
            && error.kind() != io::ErrorKind::TimedOut,
    }
}

fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let started = Instant::now();
    while started.elapsed() < TIMEOUT {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn greets_and_echoes() {
    let (handle, port, runner) = start_server();
    let mut client = connect(port);

    send_and_expect(&mut client, "hello\n", "hello\n");
    send_and_expect(&mut client, "QUIT is not alone here\n", "QUIT is not alone here\n");

    handle.shutdown();
    runner.join().expect("server thread").expect("run");
}

#[test]
fn quit_closes_only_that_client() {
    let (handle, port, runner) = start_server();
    let mut quitter = connect(port);
    let mut stayer = connect(port);
    assert!(wait_until(|| handle.connection_count() == 2));

    send_and_expect(&mut quitter, "QUIT\n", "QUIT\n");
    assert!(is_closed_by_server(&mut quitter));
    assert!(wait_until(|| handle.connection_count() == 1));

    send_and_expect(&mut stayer, "still here\n", "still here\n");
    assert_eq!(handle.state(), ServerState::Running);

    handle.shutdown();
    runner.join().expect("server thread").expect("run");
}

#[test]
fn wrong_case_command_gets_a_hint() {
    let (handle, port, runner) = start_server();
    let mut client = connect(port);

    let expected = format!("quit\n{CASE_HINT}");
    send_and_expect(&mut client, "quit\n", &expected);

    let expected = format!("Shutdown\n{CASE_HINT}");
    send_and_expect(&mut client, "Shutdown\n", &expected);

    send_and_expect(&mut client, "after hint\n", "after hint\n");
    assert_eq!(handle.state(), ServerState::Running);

    handle.shutdown();
    runner.join().expect("server thread").expect("run");
}

#[test]
fn shutdown_command_closes_everything() {
    let (handle, port, runner) = start_server();
    let mut clients: Vec<StdTcpStream> = (0..3).map(|_| connect(port)).collect();
    assert!(wait_until(|| handle.connection_count() == 3));
    assert_eq!(handle.connections().len(), 3);

    clients[1].write_all(b"SHUTDOWN\n").expect("write");

    runner.join().expect("server thread").expect("run");

    assert_eq!(handle.state(), ServerState::Stopped);
    assert_eq!(handle.connection_count(), 0);
    for client in &mut clients {
        assert!(is_closed_by_server(client));
    }
    assert!(StdTcpStream::connect(("127.0.0.1", port)).is_err());
}

#[test]
fn client_disconnect_is_deregistered() {
    let (handle, port, runner) = start_server();
    let client = connect(port);
    assert!(wait_until(|| handle.connection_count() == 1));

    drop(client);

    assert!(wait_until(|| handle.connection_count() == 0));
    assert_eq!(handle.state(), ServerState::Running);

    handle.shutdown();
    handle.shutdown();
    runner.join().expect("server thread").expect("run");
    assert_eq!(handle.state(), ServerState::Stopped);
}

#[test]
fn lines_sent_together_are_handled_one_by_one() {
    let (handle, port, runner) = start_server();
    let mut client = connect(port);
    assert!(wait_until(|| handle.connection_count() == 1));

    send_and_expect(&mut client, "hello\nQUIT\n", "hello\nQUIT\n");

    assert!(is_closed_by_server(&mut client));
    assert!(wait_until(|| handle.connection_count() == 0));

    handle.shutdown();
    runner.join().expect("server thread").expect("run");
}

#[test]
fn character_split_across_writes_is_echoed_intact() {
    let (handle, port, runner) = start_server();
    let mut client = connect(port);
    client.set_nodelay(true).expect("nodelay");

    let line = "café ☕\n".as_bytes();
    let split = 4; // inside the two-byte 'é'
    client.write_all(&line[..split]).expect("first half");
    thread::sleep(Duration::from_millis(50));
    client.write_all(&line[split..]).expect("second half");

    assert_eq!(read_exactly(&mut client, line.len()), "café ☕\n");
    assert_eq!(handle.connection_count(), 1);

    handle.shutdown();
    runner.join().expect("server thread").expect("run");
}

#[test]
fn unbounded_connection_timeout_is_accepted() {
    let config = ServerConfig::new()
        .port(0)
        .accept_poll_interval(Duration::from_millis(20))
        .connection_timeout(Some(Duration::MAX));
    let server = EchoServer::bind(config).expect("bind echo server");
    let port = server.local_port().expect("listening port");
    let handle = server.handle();
    let runner = thread::spawn(move || server.run());

    let mut client = connect(port);
    send_and_expect(&mut client, "still works\n", "still works\n");

    handle.shutdown();
    runner.join().expect("server thread").expect("run");
}
