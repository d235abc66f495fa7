//! Client registry
//!
//! Tracks the live connection handles. Every structural change goes through
//! one exclusive lock; broadcast iterates a snapshot so per-client I/O never
//! runs under that lock.

use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use crate::client::{ConnectionHandle, ConnectionId};

/// Registry for tracking active clients, in accept order
#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: Mutex<Vec<Arc<ConnectionHandle>>>,
}

/// Exclusive access to the registry, for mutations that must be atomic with
/// the event they raise.
pub struct RegistryGuard<'a> {
    clients: MutexGuard<'a, Vec<Arc<ConnectionHandle>>>,
}

impl RegistryGuard<'_> {
    /// Adds a handle. A handle whose id is already present is ignored.
    pub fn insert(&mut self, handle: Arc<ConnectionHandle>) -> bool {
        if self.clients.iter().any(|c| c.id() == handle.id()) {
            return false;
        }
        self.clients.push(handle);
        true
    }

    /// Removes a handle. Removing an absent id is a no-op.
    pub fn remove(&mut self, id: ConnectionId) -> Option<Arc<ConnectionHandle>> {
        let index = self.clients.iter().position(|c| c.id() == id)?;
        Some(self.clients.remove(index))
    }

    /// Empties the registry, handing back everything it held.
    pub fn drain(&mut self) -> Vec<Arc<ConnectionHandle>> {
        std::mem::take(&mut *self.clients)
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self) -> RegistryGuard<'_> {
        RegistryGuard {
            clients: self.clients.lock().await,
        }
    }

    pub async fn insert(&self, handle: Arc<ConnectionHandle>) -> bool {
        self.lock().await.insert(handle)
    }

    pub async fn remove(&self, id: ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.lock().await.remove(id)
    }

    pub async fn get(&self, id: ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.clients
            .lock()
            .await
            .iter()
            .find(|c| c.id() == id)
            .cloned()
    }

    /// Point-in-time copy of the live handles.
    pub async fn snapshot(&self) -> Vec<Arc<ConnectionHandle>> {
        self.clients.lock().await.clone()
    }

    pub async fn ids(&self) -> Vec<ConnectionId> {
        self.clients.lock().await.iter().map(|c| c.id()).collect()
    }

    pub async fn len(&self) -> usize {
        self.clients.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.lock().await.is_empty()
    }
}
