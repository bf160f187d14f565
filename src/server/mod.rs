//! Thread-per-connection echo server and its connection registry.
//!
//! - [`registry`]: [`ConnectionRegistry`], the only state shared between the
//!   accept loop and connection handlers
//! - [`echo`]: [`EchoServer`], its configuration and remote-control handle
//!
//! The server moves through [`ServerState`] exactly once:
//! `Running → ShuttingDown → Stopped`.

pub mod echo;
pub mod registry;

pub use echo::{Command, EchoServer, ServerConfig, ServerHandle};
pub use registry::ConnectionRegistry;

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerState {
    Running = 0,
    ShuttingDown = 1,
    Stopped = 2,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::ShuttingDown => write!(f, "shutting down"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Atomic cell holding a [`ServerState`].
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new(state: ServerState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub(crate) fn load(&self) -> ServerState {
        match self.0.load(Ordering::Acquire) {
            0 => ServerState::Running,
            1 => ServerState::ShuttingDown,
            _ => ServerState::Stopped,
        }
    }

    pub(crate) fn store(&self, state: ServerState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Moves `from → to`; returns false if the state was not `from`.
    pub(crate) fn transition(&self, from: ServerState, to: ServerState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
