//! Blocking, timeout-aware socket over a raw OS descriptor.
//!
//! A [`Socket`] exclusively owns one descriptor and walks the state machine
//!
//! ```text
//! Unbound ─┬─ listen ──────────────▶ Listening ─┐
//!          └─ connect ─▶ Connecting ─▶ Connected ┴─ close ─▶ Closed
//! ```
//!
//! Descriptors are put in non-blocking mode at creation. Every blocking
//! operation first waits for readiness with [`readiness::wait_for`], bounded by
//! the call's timeout, and then issues the non-blocking syscall, retrying on
//! `EAGAIN`/`EINTR` until the deadline runs out.
//!
//! # Example
//!
//! ```no_run
//! use greensocket::{Family, Protocol, Socket, SocketType};
//! use std::time::Duration;
//!
//! let mut socket = Socket::create(Family::Inet, SocketType::Stream, Protocol::Tcp)?;
//! socket.connect("127.0.0.1", 1337, Some(Duration::from_secs(5)))?;
//! socket.write_all(b"hello")?;
//!
//! let mut buffer = [0u8; 4096];
//! let count = socket.read(&mut buffer)?;
//! if count == 0 {
//!     println!("server closed the connection");
//! }
//! # Ok::<(), greensocket::SocketError>(())
//! ```

use crate::error::{Result, SocketError};
use crate::net::address::{Address, Family};
use crate::reactor::fd;
use crate::reactor::readiness::{self, Interest};
use crate::time::Deadline;

use libc::{
    IPPROTO_TCP, IPPROTO_UDP, SHUT_RDWR, SO_ERROR, SO_REUSEADDR, SOCK_DGRAM, SOCK_STREAM,
    SOL_SOCKET, c_int, c_void, sockaddr, sockaddr_storage, socklen_t,
};
use std::fmt;
use std::io;
use std::mem;
use std::os::unix::io::RawFd;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;

#[cfg(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly"
))]
const SEND_FLAGS: c_int = libc::MSG_NOSIGNAL;

#[cfg(not(any(
    target_os = "linux",
    target_os = "android",
    target_os = "freebsd",
    target_os = "openbsd",
    target_os = "netbsd",
    target_os = "dragonfly"
)))]
const SEND_FLAGS: c_int = 0;

/// Default `listen(2)` backlog.
pub const DEFAULT_BACKLOG: i32 = 128;

/// Lifecycle state of a [`Socket`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SocketState {
    Unbound = 0,
    Listening = 1,
    Connecting = 2,
    Connected = 3,
    Closed = 4,
}

impl SocketState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Unbound,
            1 => Self::Listening,
            2 => Self::Connecting,
            3 => Self::Connected,
            _ => Self::Closed,
        }
    }
}

impl fmt::Display for SocketState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unbound => "unbound",
            Self::Listening => "listening",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketType {
    Stream,
    Datagram,
}

impl SocketType {
    pub fn as_raw(self) -> c_int {
        match self {
            Self::Stream => SOCK_STREAM,
            Self::Datagram => SOCK_DGRAM,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Tcp,
    Udp,
    /// Unix-domain sockets have no protocol number.
    Unix,
}

impl Protocol {
    /// The protocol a socket of `family` and `socket_type` uses by default.
    pub fn default_for(family: Family, socket_type: SocketType) -> Self {
        match (family, socket_type) {
            (Family::Unix, _) => Self::Unix,
            (_, SocketType::Stream) => Self::Tcp,
            (_, SocketType::Datagram) => Self::Udp,
        }
    }

    pub fn as_raw(self) -> c_int {
        match self {
            Self::Tcp => IPPROTO_TCP,
            Self::Udp => IPPROTO_UDP,
            Self::Unix => 0,
        }
    }
}

/// A socket owning one OS descriptor.
///
/// Blocking calls (`connect`, `accept_client_connection`, `read`, `write`)
/// take `&self` where possible, so a socket can be shared behind an `Arc`
/// and closed from another thread: [`Socket::close`] shuts the descriptor
/// down, which wakes any thread blocked on it, and every later call fails
/// with [`SocketError::Closed`]. The descriptor number itself is released
/// only when the socket is dropped, so a thread still inside a syscall can
/// never reach a descriptor the kernel has handed to someone else.
pub struct Socket {
    file_descriptor: RawFd,
    state: AtomicU8,

    family: Family,
    socket_type: SocketType,
    protocol: Protocol,

    local_address: Option<Address>,
    remote_address: Option<Address>,

    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    reuse_address: bool,

    /// Path to unlink on close, set when this socket bound a Unix path.
    bound_path: Option<PathBuf>,
}

impl Socket {
    /// Allocates a new descriptor of the given family, type and protocol.
    ///
    /// The descriptor is non-blocking and close-on-exec; the returned socket
    /// is `Unbound` and owns it exclusively.
    pub fn create(family: Family, socket_type: SocketType, protocol: Protocol) -> Result<Self> {
        let protocol_number = if family == Family::Unix {
            0
        } else {
            protocol.as_raw()
        };

        let file_descriptor = fd::check(unsafe {
            libc::socket(family.as_raw(), socket_type.as_raw(), protocol_number)
        })?;

        let socket = Self::from_descriptor(
            file_descriptor,
            family,
            socket_type,
            protocol,
            SocketState::Unbound,
        );
        socket.prepare_descriptor()?;

        log::debug!(
            "[Socket] Created {} {:?} socket on descriptor {}",
            family,
            socket_type,
            file_descriptor
        );

        Ok(socket)
    }

    /// Returns a pair of connected Unix-domain sockets.
    pub fn pair(socket_type: SocketType) -> Result<(Self, Self)> {
        let mut descriptors = [0 as RawFd; 2];
        fd::check(unsafe {
            libc::socketpair(
                Family::Unix.as_raw(),
                socket_type.as_raw(),
                0,
                descriptors.as_mut_ptr(),
            )
        })?;

        let [first, second] = descriptors.map(|file_descriptor| {
            Self::from_descriptor(
                file_descriptor,
                Family::Unix,
                socket_type,
                Protocol::Unix,
                SocketState::Connected,
            )
        });
        first.prepare_descriptor()?;
        second.prepare_descriptor()?;

        Ok((first, second))
    }

    fn from_descriptor(
        file_descriptor: RawFd,
        family: Family,
        socket_type: SocketType,
        protocol: Protocol,
        state: SocketState,
    ) -> Self {
        Self {
            file_descriptor,
            state: AtomicU8::new(state as u8),
            family,
            socket_type,
            protocol,
            local_address: None,
            remote_address: None,
            read_timeout: None,
            write_timeout: None,
            reuse_address: true,
            bound_path: None,
        }
    }

    /// Non-blocking, close-on-exec, and no `SIGPIPE` where the platform needs
    /// a socket option for it. On failure the socket is dropped by the
    /// caller, which releases the descriptor.
    fn prepare_descriptor(&self) -> Result<()> {
        fd::set_nonblocking(self.file_descriptor)?;
        fd::set_cloexec(self.file_descriptor)?;

        #[cfg(target_vendor = "apple")]
        self.set_option(SOL_SOCKET, libc::SO_NOSIGPIPE, 1)?;

        Ok(())
    }

    // ========================================================================
    // Server side
    // ========================================================================

    /// Binds to the wildcard address of this socket's family on `port` and,
    /// for stream sockets, starts listening with `backlog`.
    ///
    /// Datagram sockets are only bound. Port `0` picks an ephemeral port; see
    /// [`Socket::listening_port`].
    pub fn listen(&mut self, port: u16, backlog: i32) -> Result<()> {
        let address = Address::wildcard(self.family, port)?;
        self.listen_on(&address, backlog)
    }

    /// Binds to `address` and starts listening (stream) or just binds (datagram).
    pub fn listen_on(&mut self, address: &Address, backlog: i32) -> Result<()> {
        self.bind(address)?;

        if self.socket_type == SocketType::Stream {
            let result = unsafe { libc::listen(self.file_descriptor, backlog) };
            fd::check(result).map_err(|source| SocketError::Bind {
                address: address.to_string(),
                source,
            })?;
        }

        self.set_state(SocketState::Listening);
        log::info!(
            "[Socket] Listening on {}",
            self.local_address
                .as_ref()
                .map_or_else(|| address.to_string(), Address::to_string)
        );

        Ok(())
    }

    /// Binds the descriptor to `address` without changing state.
    pub fn bind(&mut self, address: &Address) -> Result<()> {
        self.expect_state(SocketState::Unbound)?;

        if address.family() != self.family {
            return Err(SocketError::invalid_argument(format!(
                "cannot bind a {} socket to {} address {}",
                self.family,
                address.family(),
                address
            )));
        }

        if self.reuse_address && self.family != Family::Unix {
            self.set_option(SOL_SOCKET, SO_REUSEADDR, 1)?;
        }

        let result = address.with_sockaddr(|pointer, length| unsafe {
            libc::bind(self.file_descriptor, pointer, length)
        });
        fd::check(result).map_err(|source| SocketError::Bind {
            address: address.to_string(),
            source,
        })?;

        self.bound_path = address.path();
        self.local_address = bound_address(self.file_descriptor).or(Some(*address));

        Ok(())
    }

    /// Blocks until a peer connects and returns a new `Connected` socket that
    /// owns the accepted descriptor.
    ///
    /// The wait is bounded by this socket's read timeout; the new socket
    /// inherits the read and write timeouts.
    pub fn accept_client_connection(&self) -> Result<Socket> {
        self.ensure_open()?;
        self.expect_state(SocketState::Listening)?;

        if self.socket_type != SocketType::Stream {
            return Err(SocketError::invalid_argument(
                "datagram sockets do not accept connections",
            ));
        }

        let deadline = Deadline::after(self.read_timeout);

        loop {
            readiness::wait_for(self.file_descriptor, Interest::Read, &deadline)
                .map_err(|error| self.closed_or(error))?;
            self.ensure_open()?;

            let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
            let mut length = mem::size_of::<sockaddr_storage>() as socklen_t;

            let result = unsafe {
                libc::accept(
                    self.file_descriptor,
                    &mut storage as *mut sockaddr_storage as *mut sockaddr,
                    &mut length,
                )
            };

            let client_descriptor = match fd::check(result) {
                Ok(client_descriptor) => client_descriptor,
                Err(error)
                    if fd::would_block(&error)
                        || fd::is_interrupted(&error)
                        || error.raw_os_error() == Some(libc::ECONNABORTED) =>
                {
                    continue;
                }
                Err(error) => return Err(self.closed_or(error.into())),
            };

            let mut client = Self::from_descriptor(
                client_descriptor,
                self.family,
                self.socket_type,
                self.protocol,
                SocketState::Connected,
            );
            client.prepare_descriptor()?;
            client.read_timeout = self.read_timeout;
            client.write_timeout = self.write_timeout;
            client.remote_address = Address::from_native(&storage, length);
            client.local_address = bound_address(client_descriptor);

            log::debug!(
                "[Socket] Accepted descriptor {} from {}",
                client_descriptor,
                client.remote_hostname()
            );

            return Ok(client);
        }
    }

    // ========================================================================
    // Client side
    // ========================================================================

    /// Resolves `host`/`port` in this socket's family and connects to it.
    ///
    /// For Unix-domain sockets `host` is the socket path.
    pub fn connect(&mut self, host: &str, port: u16, timeout: Option<Duration>) -> Result<()> {
        let address = Address::from_host_port(host, port, self.family)?;
        self.connect_to(&address, timeout)
    }

    /// Connects to `address`, waiting at most `timeout` for the handshake.
    ///
    /// On any failure the socket is closed; create a new one to retry.
    pub fn connect_to(&mut self, address: &Address, timeout: Option<Duration>) -> Result<()> {
        self.ensure_open()?;
        self.expect_state(SocketState::Unbound)?;

        self.set_state(SocketState::Connecting);
        let deadline = Deadline::after(timeout);

        if let Err(error) = self.initiate_connect(address, &deadline) {
            log::debug!("[Socket] Connection to {} failed: {}", address, error);
            self.close();
            return Err(error);
        }

        self.remote_address = Some(*address);
        self.local_address = bound_address(self.file_descriptor);
        self.set_state(SocketState::Connected);

        log::info!("[Socket] Connected to {}", address);

        Ok(())
    }

    fn initiate_connect(&self, address: &Address, deadline: &Deadline) -> Result<()> {
        let result = address.with_sockaddr(|pointer, length| unsafe {
            libc::connect(self.file_descriptor, pointer, length)
        });

        let error = match fd::check(result) {
            Ok(_) => return Ok(()),
            Err(error) => error,
        };

        let in_progress = matches!(error.raw_os_error(), Some(libc::EINPROGRESS))
            || fd::is_interrupted(&error);
        if !in_progress {
            return Err(SocketError::Connection {
                address: address.to_string(),
                source: error,
            });
        }

        readiness::wait_for(self.file_descriptor, Interest::Write, deadline)?;

        let pending = self.get_option(SOL_SOCKET, SO_ERROR)?;
        if pending != 0 {
            return Err(SocketError::Connection {
                address: address.to_string(),
                source: io::Error::from_raw_os_error(pending),
            });
        }

        Ok(())
    }

    // ========================================================================
    // Stream I/O
    // ========================================================================

    /// Reads into `buffer` using the socket's read timeout.
    ///
    /// Returns `Ok(0)` only when the peer performed an orderly shutdown.
    pub fn read(&self, buffer: &mut [u8]) -> Result<usize> {
        self.read_with_timeout(buffer, self.read_timeout)
    }

    /// Reads up to `buffer.len()` bytes, waiting at most `timeout` for data.
    ///
    /// # Errors
    /// - [`SocketError::Closed`] when the socket is (or gets) closed locally.
    /// - [`SocketError::Timeout`] when no data arrives in time.
    /// - [`SocketError::InvalidArgument`] for an empty buffer, which could not
    ///   distinguish end-of-stream from "nothing read".
    pub fn read_with_timeout(&self, buffer: &mut [u8], timeout: Option<Duration>) -> Result<usize> {
        self.ensure_open()?;

        if buffer.is_empty() {
            return Err(SocketError::invalid_argument("read buffer is empty"));
        }

        let deadline = Deadline::after(timeout);

        loop {
            readiness::wait_for(self.file_descriptor, Interest::Read, &deadline)
                .map_err(|error| self.closed_or(error))?;
            self.ensure_open()?;

            let result = unsafe {
                libc::recv(
                    self.file_descriptor,
                    buffer.as_mut_ptr() as *mut c_void,
                    buffer.len(),
                    0,
                )
            };

            match fd::check_size(result) {
                Ok(0) if self.is_closed() => return Err(SocketError::Closed),
                Ok(count) => return Ok(count),
                Err(error) if fd::would_block(&error) || fd::is_interrupted(&error) => continue,
                Err(error) => return Err(self.io_error(error)),
            }
        }
    }

    /// Writes from `buffer` using the socket's write timeout.
    ///
    /// May write fewer bytes than requested; see [`Socket::write_all`].
    pub fn write(&self, buffer: &[u8]) -> Result<usize> {
        self.write_with_timeout(buffer, self.write_timeout)
    }

    pub fn write_with_timeout(&self, buffer: &[u8], timeout: Option<Duration>) -> Result<usize> {
        self.ensure_open()?;

        if buffer.is_empty() {
            return Ok(0);
        }

        let deadline = Deadline::after(timeout);

        loop {
            readiness::wait_for(self.file_descriptor, Interest::Write, &deadline)
                .map_err(|error| self.closed_or(error))?;
            self.ensure_open()?;

            let result = unsafe {
                libc::send(
                    self.file_descriptor,
                    buffer.as_ptr() as *const c_void,
                    buffer.len(),
                    SEND_FLAGS,
                )
            };

            match fd::check_size(result) {
                Ok(count) => return Ok(count),
                Err(error) if fd::would_block(&error) || fd::is_interrupted(&error) => continue,
                Err(error) => return Err(self.io_error(error)),
            }
        }
    }

    /// Writes the whole buffer, retrying partial writes within one write timeout.
    pub fn write_all(&self, buffer: &[u8]) -> Result<()> {
        write_all_within(buffer, Deadline::after(self.write_timeout), |chunk, timeout| {
            self.write_with_timeout(chunk, timeout)
        })
    }

    // ========================================================================
    // Datagram I/O
    // ========================================================================

    /// Receives one datagram and the address it came from.
    ///
    /// The sender address is `None` when its family is not representable.
    /// Unlike stream reads, a count of 0 is a valid empty datagram.
    pub fn read_datagram(&self, buffer: &mut [u8]) -> Result<(usize, Option<Address>)> {
        self.ensure_open()?;
        self.expect_datagram()?;

        let deadline = Deadline::after(self.read_timeout);

        loop {
            readiness::wait_for(self.file_descriptor, Interest::Read, &deadline)
                .map_err(|error| self.closed_or(error))?;
            self.ensure_open()?;

            let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
            let mut length = mem::size_of::<sockaddr_storage>() as socklen_t;

            let result = unsafe {
                libc::recvfrom(
                    self.file_descriptor,
                    buffer.as_mut_ptr() as *mut c_void,
                    buffer.len(),
                    0,
                    &mut storage as *mut sockaddr_storage as *mut sockaddr,
                    &mut length,
                )
            };

            match fd::check_size(result) {
                Ok(count) => return Ok((count, Address::from_native(&storage, length))),
                Err(error) if fd::would_block(&error) || fd::is_interrupted(&error) => continue,
                Err(error) => return Err(self.io_error(error)),
            }
        }
    }

    /// Sends `buffer` as a single datagram to `address`.
    pub fn write_to(&self, buffer: &[u8], address: &Address) -> Result<usize> {
        self.ensure_open()?;
        self.expect_datagram()?;

        let deadline = Deadline::after(self.write_timeout);

        loop {
            readiness::wait_for(self.file_descriptor, Interest::Write, &deadline)
                .map_err(|error| self.closed_or(error))?;
            self.ensure_open()?;

            let result = address.with_sockaddr(|pointer, length| unsafe {
                libc::sendto(
                    self.file_descriptor,
                    buffer.as_ptr() as *const c_void,
                    buffer.len(),
                    SEND_FLAGS,
                    pointer,
                    length,
                )
            });

            match fd::check_size(result) {
                Ok(count) => return Ok(count),
                Err(error) if fd::would_block(&error) || fd::is_interrupted(&error) => continue,
                Err(error) => return Err(self.io_error(error)),
            }
        }
    }

    // ========================================================================
    // Closing
    // ========================================================================

    /// Closes the socket. Safe to call any number of times and from any thread.
    ///
    /// Marks the socket `Closed` and shuts the descriptor down in both
    /// directions, waking threads blocked on it. The descriptor stays
    /// allocated until the socket is dropped. A Unix path bound by this
    /// socket is unlinked.
    pub fn close(&self) {
        let previous = self.state.swap(SocketState::Closed as u8, Ordering::AcqRel);
        if SocketState::from_u8(previous) == SocketState::Closed {
            return;
        }

        // Fails with ENOTCONN on sockets that never connected; nothing to undo.
        unsafe { libc::shutdown(self.file_descriptor, SHUT_RDWR) };

        if let Some(path) = &self.bound_path {
            let _ = std::fs::remove_file(path);
        }

        log::debug!("[Socket] Shut down descriptor {}", self.file_descriptor);
    }

    // ========================================================================
    // Accessors and options
    // ========================================================================

    /// The descriptor this socket owns. Not reused by the OS before drop.
    pub fn descriptor(&self) -> RawFd {
        self.file_descriptor
    }

    pub fn state(&self) -> SocketState {
        SocketState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_closed(&self) -> bool {
        self.state() == SocketState::Closed
    }

    pub fn is_listening(&self) -> bool {
        self.state() == SocketState::Listening
    }

    pub fn is_connected(&self) -> bool {
        self.state() == SocketState::Connected
    }

    pub fn family(&self) -> Family {
        self.family
    }

    pub fn socket_type(&self) -> SocketType {
        self.socket_type
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    pub fn local_address(&self) -> Option<&Address> {
        self.local_address.as_ref()
    }

    pub fn remote_address(&self) -> Option<&Address> {
        self.remote_address.as_ref()
    }

    /// Port this socket is bound to, if it is an IP socket that has been bound.
    pub fn listening_port(&self) -> Option<u16> {
        self.local_address.as_ref().and_then(Address::port)
    }

    pub fn remote_hostname(&self) -> String {
        self.remote_address
            .as_ref()
            .map(Address::hostname)
            .unwrap_or_default()
    }

    pub fn remote_port(&self) -> Option<u16> {
        self.remote_address.as_ref().and_then(Address::port)
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    pub fn write_timeout(&self) -> Option<Duration> {
        self.write_timeout
    }

    /// Bounds `read`, `read_datagram` and `accept_client_connection`.
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) {
        self.read_timeout = timeout;
    }

    /// Bounds `write`, `write_all` and `write_to`.
    pub fn set_write_timeout(&mut self, timeout: Option<Duration>) {
        self.write_timeout = timeout;
    }

    /// Whether `SO_REUSEADDR` is set before binding IP sockets.
    pub fn set_reuse_address(&mut self, reuse: bool) {
        self.reuse_address = reuse;
    }

    fn set_option(&self, level: c_int, name: c_int, value: c_int) -> io::Result<()> {
        let result = unsafe {
            libc::setsockopt(
                self.file_descriptor,
                level,
                name,
                &value as *const c_int as *const c_void,
                mem::size_of::<c_int>() as socklen_t,
            )
        };
        fd::check(result).map(|_| ())
    }

    fn get_option(&self, level: c_int, name: c_int) -> io::Result<c_int> {
        let mut value: c_int = 0;
        let mut length = mem::size_of::<c_int>() as socklen_t;
        let result = unsafe {
            libc::getsockopt(
                self.file_descriptor,
                level,
                name,
                &mut value as *mut c_int as *mut c_void,
                &mut length,
            )
        };
        fd::check(result).map(|_| value)
    }

    // ========================================================================
    // Internal helpers
    // ========================================================================

    fn set_state(&self, state: SocketState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            Err(SocketError::Closed)
        } else {
            Ok(())
        }
    }

    fn expect_state(&self, expected: SocketState) -> Result<()> {
        let actual = self.state();
        if actual == SocketState::Closed {
            return Err(SocketError::Closed);
        }
        if actual != expected {
            return Err(SocketError::InvalidState { expected, actual });
        }
        Ok(())
    }

    fn expect_datagram(&self) -> Result<()> {
        if self.socket_type != SocketType::Datagram {
            return Err(SocketError::invalid_argument(
                "datagram operation on a stream socket",
            ));
        }
        Ok(())
    }

    /// Reports [`SocketError::Closed`] instead of `error` when the socket was
    /// closed while the call was blocked.
    fn closed_or(&self, error: SocketError) -> SocketError {
        if self.is_closed() {
            SocketError::Closed
        } else {
            error
        }
    }

    fn io_error(&self, error: io::Error) -> SocketError {
        if self.is_closed() {
            return SocketError::Closed;
        }

        match error.kind() {
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => SocketError::Connection {
                address: self
                    .remote_address
                    .as_ref()
                    .map_or_else(|| "peer".to_string(), Address::to_string),
                source: error,
            },
            _ => SocketError::System(error),
        }
    }
}

/// Drives `write` until `buffer` is fully sent or `deadline` runs out.
///
/// Timeouts are reported against the deadline's original duration rather than
/// whatever was left for the last attempt.
pub(crate) fn write_all_within(
    mut buffer: &[u8],
    deadline: Deadline,
    mut write: impl FnMut(&[u8], Option<Duration>) -> Result<usize>,
) -> Result<()> {
    while !buffer.is_empty() {
        let written = match write(buffer, deadline.remaining()) {
            Ok(written) => written,
            Err(SocketError::Timeout(_)) => return Err(SocketError::Timeout(deadline.duration())),
            Err(error) => return Err(error),
        };

        if written == 0 {
            return Err(SocketError::System(io::Error::new(
                io::ErrorKind::WriteZero,
                "write returned zero bytes",
            )));
        }

        buffer = &buffer[written..];
    }

    Ok(())
}

/// Address the kernel assigned to `file_descriptor` (`getsockname(2)`).
fn bound_address(file_descriptor: RawFd) -> Option<Address> {
    let mut storage: sockaddr_storage = unsafe { mem::zeroed() };
    let mut length = mem::size_of::<sockaddr_storage>() as socklen_t;

    let result = unsafe {
        libc::getsockname(
            file_descriptor,
            &mut storage as *mut sockaddr_storage as *mut sockaddr,
            &mut length,
        )
    };

    if result < 0 {
        return None;
    }

    Address::from_native(&storage, length)
}

impl Drop for Socket {
    fn drop(&mut self) {
        self.close();

        // Last owner: no thread can still be inside a syscall on this number.
        unsafe { libc::close(self.file_descriptor) };
        log::trace!("[Socket] Released descriptor {}", self.file_descriptor);
    }
}

impl fmt::Debug for Socket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Socket")
            .field("descriptor", &self.file_descriptor)
            .field("state", &self.state())
            .field("family", &self.family)
            .field("socket_type", &self.socket_type)
            .field("local_address", &self.local_address)
            .field("remote_address", &self.remote_address)
            .finish_non_exhaustive()
    }
}
