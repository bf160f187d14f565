//! Line echo server with exact-case `QUIT` and `SHUTDOWN` commands.
//!
//! One accept loop hands every connection to its own thread. Each handler
//! greets the client with [`BANNER`], then splits what it reads into
//! `\n`-terminated lines and echoes each one:
//!
//! - a line whose trimmed text is exactly `QUIT` is echoed and ends that
//!   connection only;
//! - exactly `SHUTDOWN` stops the server: every registered connection and the
//!   listener are closed, and [`EchoServer::run`] returns;
//! - `quit`/`Shutdown`/... (right word, wrong case) is echoed followed by
//!   [`CASE_HINT`] and does nothing else.
//!
//! A handler that hits EOF, an I/O error, undecodable text or a line longer
//! than [`MAX_LINE_LEN`] deregisters and closes its own socket; other
//! connections are unaffected.

use crate::builder::SocketBuilder;
use crate::error::{Result, SocketError};
use crate::net::address::Family;
use crate::net::socket::{DEFAULT_BACKLOG, Socket};
use crate::server::registry::ConnectionRegistry;
use crate::server::{ServerState, StateCell};

use std::os::unix::io::RawFd;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

pub const QUIT_COMMAND: &str = "QUIT";
pub const SHUTDOWN_COMMAND: &str = "SHUTDOWN";

/// Greeting written to every new connection.
pub const BANNER: &str = "Hello, type 'QUIT' to end session\nor 'SHUTDOWN' to stop server.\n";

/// Sent after echoing a command typed in the wrong case.
pub const CASE_HINT: &str = "If you want to QUIT or SHUTDOWN, please type the name in all caps. 😃\n";

pub const DEFAULT_PORT: u16 = 1337;

/// Longest line a client may send before its connection is dropped.
pub const MAX_LINE_LEN: usize = 64 * 1024;

const DEFAULT_BUFFER_SIZE: usize = 4096;
const DEFAULT_ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// What a received line asks the server to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Plain text to echo back.
    Echo,
    Quit,
    Shutdown,
    /// A command word in the wrong case.
    CaseMismatch,
}

impl Command {
    /// Classifies `text` by exact, case-sensitive equality of its trimmed form.
    pub fn parse(text: &str) -> Self {
        let line = text.trim();

        if line == QUIT_COMMAND {
            Self::Quit
        } else if line == SHUTDOWN_COMMAND {
            Self::Shutdown
        } else if line.eq_ignore_ascii_case(QUIT_COMMAND)
            || line.eq_ignore_ascii_case(SHUTDOWN_COMMAND)
        {
            Self::CaseMismatch
        } else {
            Self::Echo
        }
    }
}

/// Echo server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    family: Family,
    port: u16,
    backlog: i32,
    banner: String,
    buffer_size: usize,
    accept_poll_interval: Duration,
    connection_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            family: Family::Inet,
            port: DEFAULT_PORT,
            backlog: DEFAULT_BACKLOG,
            banner: BANNER.to_string(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            accept_poll_interval: DEFAULT_ACCEPT_POLL_INTERVAL,
            connection_timeout: None,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// IPv4 or IPv6 listener.
    pub fn family(mut self, family: Family) -> Self {
        self.family = family;
        self
    }

    /// Port to listen on; `0` picks an ephemeral port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn backlog(mut self, backlog: i32) -> Self {
        self.backlog = backlog;
        self
    }

    pub fn banner(mut self, banner: impl Into<String>) -> Self {
        self.banner = banner.into();
        self
    }

    /// Maximum bytes read per chunk.
    pub fn buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size.max(1);
        self
    }

    /// How long one accept wait lasts before the loop re-checks the state.
    pub fn accept_poll_interval(mut self, interval: Duration) -> Self {
        self.accept_poll_interval = interval;
        self
    }

    /// Read/write timeout of accepted connections; `None` waits for the peer.
    pub fn connection_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connection_timeout = timeout;
        self
    }
}

/// State shared by the accept loop, handlers and [`ServerHandle`]s.
#[derive(Debug)]
struct Shared {
    listener: Socket,
    registry: ConnectionRegistry,
    state: StateCell,
    config: ServerConfig,
    stopped: Mutex<bool>,
    stopped_signal: Condvar,
}

impl Shared {
    fn new(listener: Socket, config: ServerConfig) -> Self {
        Self {
            listener,
            registry: ConnectionRegistry::new(),
            state: StateCell::new(ServerState::Running),
            config,
            stopped: Mutex::new(false),
            stopped_signal: Condvar::new(),
        }
    }

    fn is_running(&self) -> bool {
        self.state.load() == ServerState::Running
    }

    fn shutdown(&self) {
        if !self
            .state
            .transition(ServerState::Running, ServerState::ShuttingDown)
        {
            return;
        }

        log::info!("[EchoServer] Shutdown in progress...");

        let closed = self.registry.close_all();
        log::info!("[EchoServer] Closed {} connections", closed);

        self.listener.close();
        self.state.store(ServerState::Stopped);

        let mut stopped = self.stopped.lock().unwrap_or_else(PoisonError::into_inner);
        *stopped = true;
        self.stopped_signal.notify_all();

        log::info!("[EchoServer] Server stopped");
    }

    /// Blocks until whichever thread started the shutdown has finished it.
    fn wait_stopped(&self) {
        let stopped = self.stopped.lock().unwrap_or_else(PoisonError::into_inner);
        let _stopped = self
            .stopped_signal
            .wait_while(stopped, |stopped| !*stopped)
            .unwrap_or_else(PoisonError::into_inner);
    }
}

/// Cloneable remote control for a running [`EchoServer`].
#[derive(Debug, Clone)]
pub struct ServerHandle {
    shared: Arc<Shared>,
}

impl ServerHandle {
    /// Starts the shutdown path; only the first call has any effect.
    pub fn shutdown(&self) {
        self.shared.shutdown();
    }

    pub fn state(&self) -> ServerState {
        self.shared.state.load()
    }

    pub fn connection_count(&self) -> usize {
        self.shared.registry.len()
    }

    /// Descriptors of the live connections.
    pub fn connections(&self) -> Vec<RawFd> {
        self.shared.registry.descriptors()
    }

    pub fn local_port(&self) -> Option<u16> {
        self.shared.listener.listening_port()
    }
}

/// Echo server owning its listening socket and connection registry.
#[derive(Debug)]
pub struct EchoServer {
    shared: Arc<Shared>,
}

impl EchoServer {
    /// Creates the listener and starts listening; connections are accepted
    /// once [`EchoServer::run`] is called.
    pub fn bind(config: ServerConfig) -> Result<Self> {
        let mut listener = SocketBuilder::new(config.family)
            .read_timeout(config.accept_poll_interval)
            .build()?;
        listener.listen(config.port, config.backlog)?;

        Ok(Self {
            shared: Arc::new(Shared::new(listener, config)),
        })
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn local_port(&self) -> Option<u16> {
        self.shared.listener.listening_port()
    }

    pub fn state(&self) -> ServerState {
        self.shared.state.load()
    }

    /// Runs the accept loop until the server leaves `Running`.
    ///
    /// Returns `Ok(())` once the shutdown has completed, whichever thread
    /// started it. Accept failures other than the listener being closed are
    /// logged and retried after one accept poll interval.
    pub fn run(&self) -> Result<()> {
        let shared = &self.shared;

        while shared.is_running() {
            let mut socket = match shared.listener.accept_client_connection() {
                Ok(socket) => socket,
                Err(error) => match AcceptFailure::classify(&error, shared.is_running()) {
                    AcceptFailure::Retry => continue,
                    AcceptFailure::Stop => break,
                    AcceptFailure::BackOff => {
                        log::warn!("[EchoServer] Accept failed: {}", error);
                        thread::sleep(shared.config.accept_poll_interval);
                        continue;
                    }
                },
            };

            socket.set_read_timeout(shared.config.connection_timeout);
            socket.set_write_timeout(shared.config.connection_timeout);

            log::info!(
                "[EchoServer] Accepted connection from {}:{}",
                socket.remote_hostname(),
                socket.remote_port().unwrap_or_default()
            );

            self.add_connection(Arc::new(socket));
        }

        // Reaching here without a shutdown command means the listener failed.
        shared.shutdown();
        shared.wait_stopped();
        Ok(())
    }

    fn add_connection(&self, socket: Arc<Socket>) {
        self.shared.registry.insert(Arc::clone(&socket));

        // A shutdown that drained the registry before this insert missed it.
        if !self.shared.is_running() {
            self.shared.registry.remove(&socket);
            socket.close();
            return;
        }

        let shared = Arc::clone(&self.shared);
        let handler_socket = Arc::clone(&socket);

        let spawned = thread::Builder::new()
            .name(format!("echo-connection-{}", socket.descriptor()))
            .spawn(move || handle_connection(&shared, &handler_socket));

        if let Err(error) = spawned {
            log::error!("[EchoServer] Unable to spawn connection handler: {}", error);
            self.shared.registry.remove(&socket);
            socket.close();
        }
    }
}

/// What the accept loop does after a failed accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AcceptFailure {
    /// The poll interval elapsed with nobody connecting.
    Retry,
    /// The listener is gone or the server is shutting down.
    Stop,
    /// A real failure such as `EMFILE`, which would repeat immediately.
    BackOff,
}

impl AcceptFailure {
    fn classify(error: &SocketError, running: bool) -> Self {
        match error {
            _ if !running => Self::Stop,
            SocketError::Closed => Self::Stop,
            SocketError::Timeout(_) => Self::Retry,
            _ => Self::BackOff,
        }
    }
}

/// Deregisters and closes a connection when its handler ends, including by
/// unwinding.
struct ConnectionGuard<'a> {
    shared: &'a Shared,
    socket: &'a Arc<Socket>,
    peer: &'a str,
}

impl Drop for ConnectionGuard<'_> {
    fn drop(&mut self) {
        self.shared.registry.remove(self.socket);
        self.socket.close();
        log::info!("[EchoServer] Socket {} closed", self.peer);
    }
}

fn handle_connection(shared: &Shared, socket: &Arc<Socket>) {
    let peer = format!(
        "{}:{}",
        socket.remote_hostname(),
        socket.remote_port().unwrap_or_default()
    );
    let _guard = ConnectionGuard {
        shared,
        socket,
        peer: &peer,
    };

    if let Err(error) = serve_connection(shared, socket, &peer) {
        if shared.is_running() {
            log::warn!("[EchoServer] Error on connection {}: {}", peer, error);
        } else {
            log::debug!("[EchoServer] Connection {} ended during shutdown: {}", peer, error);
        }
    }
}

/// Accumulates stream bytes and hands out complete lines.
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn extend(&mut self, bytes: &[u8]) {
        self.pending.extend_from_slice(bytes);
    }

    /// Next `\n`-terminated line, terminator included.
    fn next_line(&mut self) -> Option<Vec<u8>> {
        let end = self.pending.iter().position(|&byte| byte == b'\n')?;
        Some(self.pending.drain(..=end).collect())
    }

    /// Whatever is left once the peer stops sending.
    fn take_remainder(&mut self) -> Option<Vec<u8>> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }

    fn len(&self) -> usize {
        self.pending.len()
    }
}

/// Whether the handler keeps reading after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

fn serve_connection(shared: &Shared, socket: &Socket, peer: &str) -> Result<()> {
    socket.write_all(shared.config.banner.as_bytes())?;

    let mut buffer = vec![0u8; shared.config.buffer_size];
    let mut lines = LineBuffer::default();

    loop {
        let count = socket.read(&mut buffer)?;
        if count == 0 {
            log::info!("[EchoServer] Connection {} closed by peer", peer);
            if let Some(line) = lines.take_remainder() {
                serve_line(shared, socket, peer, &line)?;
            }
            return Ok(());
        }

        lines.extend(&buffer[..count]);
        while let Some(line) = lines.next_line() {
            if serve_line(shared, socket, peer, &line)? == Flow::Stop {
                return Ok(());
            }
        }

        if lines.len() > MAX_LINE_LEN {
            log::warn!(
                "[EchoServer] Dropping connection {}: line exceeds {} bytes",
                peer,
                MAX_LINE_LEN
            );
            return Ok(());
        }
    }
}

fn serve_line(shared: &Shared, socket: &Socket, peer: &str, line: &[u8]) -> Result<Flow> {
    let Ok(text) = std::str::from_utf8(line) else {
        log::warn!("[EchoServer] Dropping undecodable message from {}", peer);
        return Ok(Flow::Stop);
    };

    let command = Command::parse(text);
    if command == Command::Shutdown {
        log::info!("[EchoServer] Shutdown requested by connection at {}", peer);
        shared.shutdown();
        return Ok(Flow::Stop);
    }

    log::debug!("[EchoServer] Received from {}: {}", peer, text.trim_end());
    socket.write_all(text.as_bytes())?;

    match command {
        Command::CaseMismatch => {
            socket.write_all(CASE_HINT.as_bytes())?;
            Ok(Flow::Continue)
        }
        Command::Quit => Ok(Flow::Stop),
        Command::Echo | Command::Shutdown => Ok(Flow::Continue),
    }
}
