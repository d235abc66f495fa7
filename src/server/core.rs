use log::{debug, info, warn};
use serde::Serialize;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::client::{ConnectionId, Packet};
use crate::config::ServerConfig;
use crate::error::{SendError, ServerError, StartError, StopError};
use crate::events::ServerEvent;
use crate::serializer::{JsonSerializer, PacketSerializer};
use crate::server::state::ServerState;

/// The accept loop currently owning the listening socket
struct AcceptTask {
    local_addr: SocketAddr,
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

/// TCP server accepting clients, dispatching their packets as events and
/// sending serialized payloads back to one or all of them.
pub struct Server<S: PacketSerializer = JsonSerializer> {
    config: ServerConfig,
    state: Arc<ServerState>,
    serializer: S,
    accept: Mutex<Option<AcceptTask>>,
}

impl Server<JsonSerializer> {
    pub fn new(config: ServerConfig) -> Self {
        Self::with_serializer(config, JsonSerializer)
    }

    /// Server listening on `ip` and a separately supplied `port`.
    pub fn with_address(ip: IpAddr, port: u16) -> Self {
        Self::new(ServerConfig::with_endpoint(SocketAddr::new(ip, port)))
    }

    /// Server listening on a combined endpoint.
    pub fn with_endpoint(endpoint: SocketAddr) -> Self {
        Self::new(ServerConfig::with_endpoint(endpoint))
    }
}

impl<S: PacketSerializer> Server<S> {
    pub fn with_serializer(config: ServerConfig, serializer: S) -> Self {
        let state = Arc::new(ServerState::new(
            config.receive_buffer_size,
            config.nodelay,
        ));
        Self {
            config,
            state,
            serializer,
            accept: Mutex::new(None),
        }
    }

    /// The serializer payloads are encoded with, for decoding received packets.
    pub fn serializer(&self) -> &S {
        &self.serializer
    }

    /// Subscribes to the server's event stream.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ServerEvent> {
        self.state.events().subscribe()
    }

    /// Binds the listener and starts accepting clients.
    ///
    /// Returns the bound address, which differs from the configured one when
    /// port 0 was requested. A server that was stopped, or whose accept loop
    /// ended on an accept fault, can be started again.
    pub async fn start(&self) -> Result<SocketAddr, ServerError> {
        let mut accept = self.accept.lock().await;
        if let Some(current) = accept.as_ref() {
            if !current.task.is_finished() {
                return Err(StartError::AlreadyRunning(current.local_addr).into());
            }
        }

        let addr = self.config.socket_addr()?;
        let recv_buffer_size = u32::try_from(self.config.receive_buffer_size)
            .map_err(|_| StartError::InvalidBufferSize(self.config.receive_buffer_size))?;
        let listener = bind_listener(addr, recv_buffer_size, self.config.listen_backlog)
            .map_err(|source| StartError::Bind { addr, source })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| StartError::Bind { addr, source })?;

        self.state.set_running(true);
        let (shutdown, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(accept_loop(
            Arc::clone(&self.state),
            listener,
            shutdown_rx,
        ));
        *accept = Some(AcceptTask {
            local_addr,
            shutdown,
            task,
        });

        info!("Starting RAX TCP server on {}", local_addr);
        Ok(local_addr)
    }

    /// Stops accepting, then forcibly disconnects and forgets every client.
    ///
    /// No events are raised for the clients closed here. Cleanup always runs
    /// to completion; a failure to join the accept loop is reported after it.
    pub async fn stop(&self) -> Result<(), ServerError> {
        self.state.set_running(false);

        let mut result = Ok(());
        let accept = self.accept.lock().await.take();
        if let Some(accept) = accept {
            // the loop may already be gone after an accept fault
            let _ = accept.shutdown.send(());
            if let Err(e) = accept.task.await {
                warn!("Accept loop on {} ended abnormally: {}", accept.local_addr, e);
                result = Err(StopError::AcceptTask(e).into());
            }
        }

        let closed = self.state.disconnect_all().await;
        info!("Server stopped, {} connections closed", closed);
        result
    }

    /// Whether the accept loop is currently alive.
    pub async fn is_listening(&self) -> bool {
        self.accept
            .lock()
            .await
            .as_ref()
            .is_some_and(|accept| !accept.task.is_finished())
    }

    /// Bound address of the live accept loop.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.accept
            .lock()
            .await
            .as_ref()
            .filter(|accept| !accept.task.is_finished())
            .map(|accept| accept.local_addr)
    }

    /// Point-in-time number of connected clients.
    pub async fn connected_clients(&self) -> usize {
        self.state.registry().len().await
    }

    /// Point-in-time list of connected clients, in accept order.
    pub async fn connection_ids(&self) -> Vec<ConnectionId> {
        self.state.registry().ids().await
    }

    /// Serializes `payload` once and sends it to every connected client.
    ///
    /// Returns how many clients the payload was queued for. Clients found to
    /// be gone are removed without failing the broadcast.
    pub async fn broadcast<T: Serialize + ?Sized>(&self, payload: &T) -> Result<usize, ServerError> {
        let bytes = self.serializer.serialize(payload).map_err(SendError::serialize)?;
        Ok(self.broadcast_bytes(bytes).await)
    }

    /// Serializes `payload` and sends it to one client.
    pub async fn send<T: Serialize + ?Sized>(
        &self,
        id: ConnectionId,
        payload: &T,
    ) -> Result<(), ServerError> {
        let bytes = self.serializer.serialize(payload).map_err(SendError::serialize)?;
        self.send_bytes(id, bytes).await
    }

    /// Sends raw bytes to every connected client.
    pub async fn broadcast_bytes(&self, bytes: impl Into<Packet>) -> usize {
        let packet: Packet = bytes.into();
        let clients = self.state.registry().snapshot().await;
        let mut queued = 0;
        for handle in &clients {
            if self.state.send_to_handle(handle, Arc::clone(&packet)).await {
                queued += 1;
            }
        }
        debug!(
            "Broadcast {} bytes to {}/{} clients",
            packet.len(),
            queued,
            clients.len()
        );
        queued
    }

    /// Sends raw bytes to one client.
    ///
    /// A client that is registered but turns out to be gone is removed as a
    /// disconnect; that is not an error.
    pub async fn send_bytes(&self, id: ConnectionId, bytes: impl Into<Packet>) -> Result<(), ServerError> {
        let handle = self
            .state
            .registry()
            .get(id)
            .await
            .ok_or(SendError::UnknownConnection(id))?;
        self.state.send_to_handle(&handle, bytes.into()).await;
        Ok(())
    }
}

fn bind_listener(
    addr: SocketAddr,
    recv_buffer_size: u32,
    backlog: u32,
) -> io::Result<TcpListener> {
    let socket = match addr {
        SocketAddr::V4(_) => TcpSocket::new_v4()?,
        SocketAddr::V6(_) => TcpSocket::new_v6()?,
    };
    #[cfg(not(windows))]
    socket.set_reuseaddr(true)?;
    // accepted sockets inherit the listener's receive buffer
    socket.set_recv_buffer_size(recv_buffer_size)?;
    socket.bind(addr)?;
    socket.listen(backlog)
}

/// Accepts clients until shut down or until accepting fails.
///
/// An accept fault is reported and ends the loop; connected clients keep
/// running and the server has to be started again to accept new ones.
async fn accept_loop(
    state: Arc<ServerState>,
    listener: TcpListener,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        let accepted = tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("Accept loop shutting down");
                return;
            }
            accepted = listener.accept() => accepted,
        };

        if accepted_connection(&state, accepted).await.is_break() {
            return;
        }
    }
}

/// Registers one accept result. A failed accept is reported and breaks the loop.
async fn accepted_connection(
    state: &Arc<ServerState>,
    accepted: io::Result<(TcpStream, SocketAddr)>,
) -> ControlFlow<()> {
    match accepted {
        Ok((stream, addr)) => {
            state.register(stream, addr).await;
            ControlFlow::Continue(())
        }
        Err(e) => {
            state.report(ServerError::Accept(e));
            ControlFlow::Break(())
        }
    }
}
