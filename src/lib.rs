//! Blocking socket I/O with timeouts, framed messages and an echo server.
//!
//! This crate wraps raw OS sockets behind a small, thread-friendly API. Every
//! descriptor is non-blocking internally; blocking calls wait for readiness
//! with `select(2)` so that each one can honor an optional timeout.
//!
//! # Architecture
//!
//! - **Address**: IPv4, IPv6 and Unix-domain endpoints in native layout, plus
//!   host name resolution
//! - **Socket**: lifecycle state machine (`Unbound → Listening | Connecting →
//!   Connected → Closed`) with stream and datagram I/O
//! - **SocketBuilder**: fluent configuration before the descriptor exists
//! - **DescriptorSet**: bitmask and count-prefixed descriptor sets, and
//!   readiness waits over them
//! - **MessageFramer**: 16-bit big-endian length-prefixed messages
//! - **EchoServer**: thread-per-connection echo service with `QUIT` and
//!   `SHUTDOWN` commands and a shared connection registry
//!
//! # Example
//!
//! ```no_run
//! use greensocket::{EchoServer, ServerConfig};
//!
//! let server = EchoServer::bind(ServerConfig::new().port(1337))?;
//! server.run()?;
//! # Ok::<(), greensocket::SocketError>(())
//! ```

mod builder;
pub mod error;
pub mod net;
pub mod reactor;
pub mod server;
pub mod time;

pub use builder::SocketBuilder;
pub use error::{FramePart, Result, SocketError};
pub use net::address::{Address, Family};
pub use net::framing::{MessageFramer, StreamTransport};
pub use net::socket::{Protocol, Socket, SocketState, SocketType};
pub use reactor::descriptor_set::{BitmaskSet, CompactSet, DescriptorSet, NativeSet};
pub use reactor::readiness::{Interest, Readiness};
pub use server::{ConnectionRegistry, EchoServer, ServerConfig, ServerHandle, ServerState};
pub use time::Deadline;
