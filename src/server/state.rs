//! Shared server state
//!
//! Everything the accept loop and the per-connection cycles need to reach:
//! the client registry, the event bus and the running flag. All registry
//! mutations that raise a connection event do so while holding the registry
//! lock, so a concurrent stop can never interleave between the two.

use log::{debug, info};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::net::TcpStream;

use crate::client::{
    ClientRegistry, ConnectionHandle, ConnectionId, Packet, ReceiveBuffer, read_cycle,
    write_cycle,
};
use crate::error::ServerError;
use crate::error::handlers::handle_error;
use crate::events::{EventBus, ServerEvent};

/// State shared by every task of one server
#[derive(Debug)]
pub struct ServerState {
    registry: ClientRegistry,
    events: EventBus,
    running: AtomicBool,
    receive_buffer_size: usize,
    nodelay: bool,
}

impl ServerState {
    pub fn new(receive_buffer_size: usize, nodelay: bool) -> Self {
        Self {
            registry: ClientRegistry::new(),
            events: EventBus::new(),
            running: AtomicBool::new(false),
            receive_buffer_size,
            nodelay,
        }
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::SeqCst);
    }

    /// Registers a freshly accepted socket and starts its I/O cycles.
    pub async fn register(self: &Arc<Self>, stream: TcpStream, peer_addr: SocketAddr) {
        if self.nodelay {
            if let Err(e) = stream.set_nodelay(true) {
                debug!("Could not set TCP_NODELAY for {}: {}", peer_addr, e);
            }
        }

        let (reader, writer) = stream.into_split();
        let (handle, outbound) = ConnectionHandle::new(ConnectionId::next(), peer_addr);
        let handle = Arc::new(handle);

        {
            let mut clients = self.registry.lock().await;
            if !self.is_running() {
                debug!("Dropping connection from {} accepted during shutdown", peer_addr);
                return;
            }
            clients.insert(Arc::clone(&handle));
            info!(
                "Client {} connected from {} ({} clients)",
                handle.id(),
                peer_addr,
                clients.len()
            );
            self.events.emit(ServerEvent::ConnectionChanged {
                id: handle.id(),
                address: peer_addr,
                is_connected: true,
            });
        }

        let buffer = ReceiveBuffer::new(self.receive_buffer_size);
        tokio::spawn(read_cycle(
            Arc::clone(self),
            Arc::clone(&handle),
            reader,
            buffer,
        ));
        tokio::spawn(write_cycle(Arc::clone(self), handle, writer, outbound));
    }

    /// Raises a packet event for bytes read from `handle`.
    pub fn packet_received(&self, handle: &ConnectionHandle, bytes: Vec<u8>) {
        if !self.is_running() || !handle.is_connected() {
            return;
        }
        let length = bytes.len();
        debug!("Received {} bytes from {}", length, handle.id());
        self.events.emit(ServerEvent::PacketReceived {
            id: handle.id(),
            bytes,
            length,
        });
    }

    /// Removes `handle` and raises its disconnect event.
    ///
    /// Safe to call from several paths for the same handle: only the call
    /// that actually removes it raises the event. Returns whether it did.
    pub async fn disconnect(&self, handle: &ConnectionHandle) -> bool {
        let mut clients = self.registry.lock().await;
        handle.close();
        let Some(removed) = clients.remove(handle.id()) else {
            return false;
        };
        info!(
            "Client {} ({}) disconnected ({} clients)",
            removed.id(),
            removed.peer_addr(),
            clients.len()
        );
        if self.is_running() {
            self.events.emit(ServerEvent::ConnectionChanged {
                id: removed.id(),
                address: removed.peer_addr(),
                is_connected: false,
            });
        }
        true
    }

    /// Closes every registered handle and empties the registry, without
    /// raising events. Returns how many handles were closed.
    pub async fn disconnect_all(&self) -> usize {
        let mut clients = self.registry.lock().await;
        self.set_running(false);
        let handles = clients.drain();
        for handle in &handles {
            handle.close();
            debug!("Closed connection {} ({})", handle.id(), handle.peer_addr());
        }
        handles.len()
    }

    /// Queues `packet` for `handle`. A handle that turns out to be gone is
    /// removed as a disconnect. Returns whether the packet was queued.
    pub async fn send_to_handle(&self, handle: &ConnectionHandle, packet: Packet) -> bool {
        match handle.queue(packet) {
            Ok(()) => true,
            Err(_) => {
                debug!(
                    "Connection {} is no longer connected, dropping it",
                    handle.id()
                );
                self.disconnect(handle).await;
                false
            }
        }
    }

    /// Logs an unexpected fault and reports it on the event stream.
    pub fn report(&self, err: ServerError) {
        handle_error(&err);
        if self.is_running() {
            self.events.emit(ServerEvent::Fault(Arc::new(err)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn running_state() -> Arc<ServerState> {
        let state = Arc::new(ServerState::new(1024, true));
        state.set_running(true);
        state
    }

    async fn registered(
        state: &ServerState,
    ) -> (Arc<ConnectionHandle>, mpsc::UnboundedReceiver<Packet>) {
        let (handle, rx) = ConnectionHandle::new(
            ConnectionId::next(),
            "127.0.0.1:45000".parse().unwrap(),
        );
        let handle = Arc::new(handle);
        state.registry().insert(Arc::clone(&handle)).await;
        (handle, rx)
    }

    fn disconnect_events(rx: &mut mpsc::UnboundedReceiver<ServerEvent>) -> usize {
        let mut count = 0;
        while let Ok(event) = rx.try_recv() {
            if matches!(
                event,
                ServerEvent::ConnectionChanged {
                    is_connected: false,
                    ..
                }
            ) {
                count += 1;
            }
        }
        count
    }

    #[tokio::test]
    async fn test_double_disconnect_raises_one_event() {
        let state = running_state();
        let mut events = state.events().subscribe();
        let (handle, _rx) = registered(&state).await;

        let (first, second) = tokio::join!(state.disconnect(&handle), state.disconnect(&handle));
        assert!(first ^ second);
        assert_eq!(state.registry().len().await, 0);
        assert_eq!(disconnect_events(&mut events), 1);
    }

    #[tokio::test]
    async fn test_send_to_closed_handle_is_a_disconnect() {
        let state = running_state();
        let mut events = state.events().subscribe();
        let (handle, _rx) = registered(&state).await;
        handle.close();

        let queued = state.send_to_handle(&handle, Arc::from(&b"late"[..])).await;
        assert!(!queued);
        assert_eq!(state.registry().len().await, 0);
        assert_eq!(disconnect_events(&mut events), 1);

        // a second discovery of the same dead handle stays silent
        assert!(!state.send_to_handle(&handle, Arc::from(&b"x"[..])).await);
        assert_eq!(disconnect_events(&mut events), 0);
    }

    #[tokio::test]
    async fn test_send_to_live_handle_queues_bytes() {
        let state = running_state();
        let (handle, mut rx) = registered(&state).await;

        assert!(state.send_to_handle(&handle, Arc::from(&[1u8, 2, 3][..])).await);
        assert_eq!(rx.recv().await.unwrap().as_ref(), &[1, 2, 3]);
        assert_eq!(state.registry().len().await, 1);
    }

    #[tokio::test]
    async fn test_disconnect_all_is_silent() {
        let state = running_state();
        let mut events = state.events().subscribe();
        let (a, _ra) = registered(&state).await;
        let (b, _rb) = registered(&state).await;

        assert_eq!(state.disconnect_all().await, 2);
        assert!(!state.is_running());
        assert!(!a.is_connected());
        assert!(!b.is_connected());

        // late disconnect paths after stop raise nothing
        assert!(!state.disconnect(&a).await);
        assert_eq!(disconnect_events(&mut events), 0);
    }

    #[tokio::test]
    async fn test_packets_after_stop_are_dropped() {
        let state = running_state();
        let mut events = state.events().subscribe();
        let (handle, _rx) = registered(&state).await;

        state.packet_received(&handle, vec![1, 2]);
        assert!(matches!(
            events.try_recv(),
            Ok(ServerEvent::PacketReceived { length: 2, .. })
        ));

        state.disconnect_all().await;
        state.packet_received(&handle, vec![3]);
        assert!(events.try_recv().is_err());
    }
}
