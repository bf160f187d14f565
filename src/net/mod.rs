//! Socket networking primitives.
//!
//! This module provides the blocking-with-timeout socket layer:
//! - [`address`]: [`Address`] and [`Family`], the native IPv4, IPv6 and
//!   Unix-domain endpoint representations plus name resolution
//! - [`socket`]: [`Socket`], its lifecycle state machine and stream/datagram I/O
//! - [`framing`]: 16-bit length-prefixed messages over any stream transport
//!
//! # Example
//!
//! ```no_run
//! use greensocket::{Family, SocketBuilder};
//! use std::time::Duration;
//!
//! let mut client = SocketBuilder::new(Family::Inet).build()?;
//! client.connect("127.0.0.1", 1337, Some(Duration::from_secs(5)))?;
//! client.write_all(b"hello\n")?;
//! # Ok::<(), greensocket::SocketError>(())
//! ```
//!
//! [`Address`]: address::Address
//! [`Family`]: address::Family
//! [`Socket`]: socket::Socket

pub mod address;
pub mod framing;
pub mod socket;
