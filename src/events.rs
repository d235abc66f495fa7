//! Module `events`
//!
//! The event stream the server raises to its collaborators, and the bus that
//! fans each event out to every subscriber.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use log::debug;
use tokio::sync::mpsc;

use crate::client::ConnectionId;
use crate::error::ServerError;

/// Something observable happened on the server.
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// One completed read with at least one byte.
    PacketReceived {
        id: ConnectionId,
        bytes: Vec<u8>,
        length: usize,
    },
    /// A client was accepted (`is_connected`) or went away (`!is_connected`).
    ConnectionChanged {
        id: ConnectionId,
        address: SocketAddr,
        is_connected: bool,
    },
    /// An unexpected fault, reported to whoever owns the server.
    Fault(Arc<ServerError>),
}

/// Fan-out of [`ServerEvent`]s to any number of subscribers.
///
/// Subscribers whose receiver has been dropped are pruned on the next emit.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ServerEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ServerEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    pub fn emit(&self, event: ServerEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        if subscribers.is_empty() {
            debug!("No subscribers for event {:?}", event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
