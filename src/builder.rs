//! Fluent builder for Socket construction.
//!
//! Collects the family, type, protocol and timeouts of a socket before the
//! descriptor is allocated.

use crate::error::Result;
use crate::net::address::Family;
use crate::net::socket::{Protocol, Socket, SocketType};

use std::time::Duration;

/// Builder for configured [`Socket`] instances.
///
/// # Example
/// ```no_run
/// use greensocket::{Family, SocketBuilder, SocketType};
/// use std::time::Duration;
///
/// let socket = SocketBuilder::new(Family::Inet)
///     .socket_type(SocketType::Datagram)
///     .read_timeout(Duration::from_secs(2))
///     .build()?;
/// # Ok::<(), greensocket::SocketError>(())
/// ```
#[derive(Debug, Clone)]
pub struct SocketBuilder {
    family: Family,
    socket_type: SocketType,
    protocol: Option<Protocol>,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    reuse_address: bool,
}

impl SocketBuilder {
    /// Starts a stream socket of `family` with no timeouts.
    pub fn new(family: Family) -> Self {
        Self {
            family,
            socket_type: SocketType::Stream,
            protocol: None,
            read_timeout: None,
            write_timeout: None,
            reuse_address: true,
        }
    }

    pub fn socket_type(mut self, socket_type: SocketType) -> Self {
        self.socket_type = socket_type;
        self
    }

    /// Overrides the protocol; by default it follows family and type.
    pub fn protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    /// Sets both read and write timeouts.
    pub fn timeout(self, timeout: Duration) -> Self {
        self.read_timeout(timeout).write_timeout(timeout)
    }

    pub fn reuse_address(mut self, reuse: bool) -> Self {
        self.reuse_address = reuse;
        self
    }

    /// Allocates the descriptor and applies the configuration.
    pub fn build(self) -> Result<Socket> {
        let protocol = self
            .protocol
            .unwrap_or_else(|| Protocol::default_for(self.family, self.socket_type));

        let mut socket = Socket::create(self.family, self.socket_type, protocol)?;
        socket.set_read_timeout(self.read_timeout);
        socket.set_write_timeout(self.write_timeout);
        socket.set_reuse_address(self.reuse_address);

        Ok(socket)
    }
}
