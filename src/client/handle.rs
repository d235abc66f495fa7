//! Module `handle`
//!
//! Defines the per-connection resources the server keeps for every accepted
//! socket: a process-unique [`ConnectionId`], the shared [`ConnectionHandle`]
//! that the registry and send paths see, and the [`ReceiveBuffer`] owned by the
//! connection's read cycle.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, watch};

/// Identity of one accepted socket. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Allocates the next identity.
    pub fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        Self(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Outbound packets are shared between every handle of a broadcast.
pub type Packet = Arc<[u8]>;

/// Shared view of one accepted client.
///
/// The socket itself is split between the connection's read and write cycles;
/// the handle carries what the rest of the server needs: the peer address, the
/// queue feeding the write cycle, and the close signal both cycles watch.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: ConnectionId,
    peer_addr: SocketAddr,
    outbound: mpsc::UnboundedSender<Packet>,
    closed: watch::Sender<bool>,
}

impl ConnectionHandle {
    /// Creates a handle and returns the receiving end of its outbound queue,
    /// which belongs to the connection's write cycle.
    pub fn new(id: ConnectionId, peer_addr: SocketAddr) -> (Self, mpsc::UnboundedReceiver<Packet>) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (closed, _) = watch::channel(false);
        (
            Self {
                id,
                peer_addr,
                outbound,
                closed,
            },
            outbound_rx,
        )
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Returns the remote socket address of the client.
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Returns whether the socket is still usable for reads and writes.
    pub fn is_connected(&self) -> bool {
        !*self.closed.borrow() && !self.outbound.is_closed()
    }

    /// Marks the connection closed, waking both of its I/O cycles.
    ///
    /// Returns true only for the call that performed the transition.
    pub fn close(&self) -> bool {
        self.closed.send_if_modified(|closed| {
            if *closed {
                false
            } else {
                *closed = true;
                true
            }
        })
    }

    /// Returns a receiver that observes the close transition.
    pub fn closed_signal(&self) -> watch::Receiver<bool> {
        self.closed.subscribe()
    }

    /// Queues bytes on the write cycle. Hands the packet back if the
    /// connection is no longer connected.
    pub fn queue(&self, packet: Packet) -> Result<(), Packet> {
        if !self.is_connected() {
            return Err(packet);
        }
        self.outbound.send(packet).map_err(|e| e.0)
    }
}

/// Receive buffer owned by a connection's read cycle.
///
/// Always holds exactly `capacity` bytes between reads; [`clear`](Self::clear)
/// replaces the storage instead of reusing it.
#[derive(Debug)]
pub struct ReceiveBuffer {
    bytes: Vec<u8>,
    capacity: usize,
}

impl ReceiveBuffer {
    pub fn new(capacity: usize) -> Self {
        // a zero-length read buffer would look like an orderly close
        let capacity = capacity.max(1);
        Self {
            bytes: vec![0; capacity],
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Storage handed to the socket for the next read.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Copies the `len` valid bytes of the last read into a fresh vector.
    pub fn take_packet(&self, len: usize) -> Vec<u8> {
        self.bytes[..len.min(self.capacity)].to_vec()
    }

    /// Replaces the buffer with zeroed storage of the configured capacity.
    pub fn clear(&mut self) {
        self.bytes = vec![0; self.capacity];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "127.0.0.1:40000".parse().unwrap()
    }

    #[test]
    fn test_connection_ids_are_unique() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
    }

    #[test]
    fn test_take_packet_copies_only_valid_bytes() {
        let mut buffer = ReceiveBuffer::new(8);
        buffer.as_mut_slice()[..5].copy_from_slice(&[9, 9, 9, 9, 9]);
        buffer.clear();
        buffer.as_mut_slice()[..3].copy_from_slice(&[1, 2, 3]);

        let packet = buffer.take_packet(3);
        assert_eq!(packet, vec![1, 2, 3]);

        buffer.clear();
        assert_eq!(buffer.len(), 8);
        assert!(buffer.as_mut_slice().iter().all(|b| *b == 0));
        assert_eq!(packet, vec![1, 2, 3]);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let buffer = ReceiveBuffer::new(0);
        assert_eq!(buffer.capacity(), 1);
        assert!(!buffer.is_empty());
    }

    #[test]
    fn test_close_transitions_once() {
        let (handle, _rx) = ConnectionHandle::new(ConnectionId::next(), addr());
        assert!(handle.is_connected());
        assert!(handle.close());
        assert!(!handle.close());
        assert!(!handle.is_connected());
    }

    #[test]
    fn test_queue_rejects_closed_handle() {
        let (handle, mut rx) = ConnectionHandle::new(ConnectionId::next(), addr());
        assert!(handle.queue(Arc::from(&b"hi"[..])).is_ok());
        assert_eq!(rx.try_recv().unwrap().as_ref(), b"hi");

        handle.close();
        assert!(handle.queue(Arc::from(&b"late"[..])).is_err());
    }

    #[test]
    fn test_queue_rejects_when_write_cycle_is_gone() {
        let (handle, rx) = ConnectionHandle::new(ConnectionId::next(), addr());
        drop(rx);
        assert!(!handle.is_connected());
        assert!(handle.queue(Arc::from(&b"x"[..])).is_err());
    }
}
