//! Per-connection I/O cycles
//!
//! Every accepted socket is split in two halves. The read cycle owns the read
//! half and the receive buffer and turns each completed read into one packet
//! event. The write cycle owns the write half and drains the connection's
//! outbound queue in order. Both stop as soon as the handle is closed, even
//! in the middle of an I/O operation.

use log::{debug, info};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::client::{ConnectionHandle, Packet, ReceiveBuffer};
use crate::error::handlers::is_disconnect;
use crate::error::{SendError, ServerError};
use crate::server::ServerState;

/// Reads from one client until it disconnects or is closed.
///
/// - Zero bytes read is an orderly close: the handle is removed and a
///   disconnect event raised.
/// - Reset-style io errors take the same path.
/// - Any other io error is reported as a read fault and the handle removed.
pub async fn read_cycle<R>(
    state: Arc<ServerState>,
    handle: Arc<ConnectionHandle>,
    mut reader: R,
    mut buffer: ReceiveBuffer,
) where
    R: AsyncRead + Unpin,
{
    let mut closed = handle.closed_signal();

    loop {
        if !handle.is_connected() {
            debug!("Read cycle for {} found the handle closed", handle.id());
            return;
        }

        let result = tokio::select! {
            biased;
            _ = closed.wait_for(|&is_closed| is_closed) => {
                debug!("Read cycle for {} stopped", handle.id());
                return;
            }
            result = reader.read(buffer.as_mut_slice()) => result,
        };

        match result {
            Ok(0) => {
                info!("Connection closed by client {}", handle.peer_addr());
                state.disconnect(&handle).await;
                return;
            }
            Ok(n) => {
                let packet = buffer.take_packet(n);
                state.packet_received(&handle, packet);
                buffer.clear();
            }
            Err(e) if is_disconnect(&e) => {
                info!("Connection to {} lost: {}", handle.peer_addr(), e);
                state.disconnect(&handle).await;
                return;
            }
            Err(e) => {
                state.report(ServerError::Read {
                    id: handle.id(),
                    source: e,
                });
                state.disconnect(&handle).await;
                return;
            }
        }
    }
}

/// Writes queued packets to one client, in the order they were queued.
///
/// A failed write removes the handle like a failed read would; unexpected
/// write errors are also reported as send faults. Closing the handle abandons
/// the write in progress and drops the write half without a graceful
/// shutdown, so a client that stopped reading cannot hold the socket open.
/// Only a queue that ends on its own is followed by a shutdown.
pub async fn write_cycle<W>(
    state: Arc<ServerState>,
    handle: Arc<ConnectionHandle>,
    mut writer: W,
    mut outbound: mpsc::UnboundedReceiver<Packet>,
) where
    W: AsyncWrite + Unpin,
{
    let mut closed = handle.closed_signal();

    loop {
        let packet = tokio::select! {
            biased;
            _ = closed.wait_for(|&is_closed| is_closed) => {
                debug!("Write cycle for {} stopped", handle.id());
                return;
            }
            packet = outbound.recv() => match packet {
                Some(packet) => packet,
                None => break,
            },
        };

        let result = tokio::select! {
            biased;
            _ = closed.wait_for(|&is_closed| is_closed) => {
                debug!(
                    "Abandoned {} byte write to {}, connection closed",
                    packet.len(),
                    handle.id()
                );
                return;
            }
            result = writer.write_all(&packet) => result,
        };

        if let Err(e) = result {
            if is_disconnect(&e) {
                info!("Connection to {} lost while sending: {}", handle.peer_addr(), e);
            } else {
                state.report(ServerError::Send(SendError::Io {
                    id: handle.id(),
                    source: e,
                }));
            }
            state.disconnect(&handle).await;
            return;
        }
        debug!("Sent {} bytes to {}", packet.len(), handle.id());
    }

    if let Err(e) = writer.shutdown().await {
        debug!("Shutdown of {} returned: {}", handle.id(), e);
    }
    debug!("Write cycle for {} finished", handle.id());
}
