//! Mutex-guarded table of live connections.
//!
//! The accept loop inserts each accepted socket under its descriptor and the
//! connection's handler removes it right before closing. The lock is only
//! held for the map operation itself, never across blocking socket I/O;
//! [`ConnectionRegistry::close_all`] is safe under the lock because closing
//! a socket does not block.

use crate::net::socket::Socket;

use std::collections::HashMap;
use std::os::unix::io::RawFd;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<RawFd, Arc<Socket>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A poisoned lock still guards a consistent map, so keep using it.
    fn lock(&self) -> MutexGuard<'_, HashMap<RawFd, Arc<Socket>>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `socket` under its descriptor.
    pub fn insert(&self, socket: Arc<Socket>) {
        let file_descriptor = socket.descriptor();
        self.lock().insert(file_descriptor, socket);
        log::debug!("[Registry] Registered descriptor {}", file_descriptor);
    }

    /// Removes `socket` if it is still the entry registered under its
    /// descriptor. Returns whether it was removed.
    pub fn remove(&self, socket: &Arc<Socket>) -> bool {
        let mut connections = self.lock();
        let file_descriptor = socket.descriptor();

        let registered = connections
            .get(&file_descriptor)
            .is_some_and(|entry| Arc::ptr_eq(entry, socket));
        if registered {
            connections.remove(&file_descriptor);
            log::debug!("[Registry] Removed descriptor {}", file_descriptor);
        }

        registered
    }

    pub fn contains(&self, file_descriptor: RawFd) -> bool {
        self.lock().contains_key(&file_descriptor)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Descriptors of every registered connection, sorted.
    pub fn descriptors(&self) -> Vec<RawFd> {
        let mut descriptors: Vec<RawFd> = self.lock().keys().copied().collect();
        descriptors.sort_unstable();
        descriptors
    }

    /// Closes and removes every registered connection, returning how many.
    pub fn close_all(&self) -> usize {
        let mut connections = self.lock();
        let count = connections.len();

        for (_, socket) in connections.drain() {
            socket.close();
        }

        count
    }
}
