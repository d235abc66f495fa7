//! Error types
//!
//! Defines the faults the server reports upward. Expected disconnects
//! (zero-byte reads, resets, write-time discovery of a closed socket) are not
//! errors and never appear here.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::client::ConnectionId;

/// Failures while bringing the listener up.
#[derive(Debug, Error)]
pub enum StartError {
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("invalid bind address: {0}")]
    InvalidAddress(String),

    #[error("receive buffer size {0} is out of range for the listening socket")]
    InvalidBufferSize(usize),

    #[error("server is already listening on {0}")]
    AlreadyRunning(SocketAddr),
}

/// Failures while tearing the server down.
#[derive(Debug, Error)]
pub enum StopError {
    #[error("accept loop did not shut down cleanly: {0}")]
    AcceptTask(#[source] tokio::task::JoinError),
}

/// Failures while sending to a connection.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("connection {0} is not registered")]
    UnknownConnection(ConnectionId),

    #[error("failed to serialize payload: {0}")]
    Serialize(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("write to connection {id} failed: {source}")]
    Io {
        id: ConnectionId,
        #[source]
        source: io::Error,
    },
}

impl SendError {
    /// Wraps the error of whichever serializer the server was built with.
    pub fn serialize(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Serialize(Box::new(err))
    }
}

/// General server error that encompasses all reported fault kinds
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server could not be started: {0}")]
    Start(#[from] StartError),

    #[error("error while stopping the server: {0}")]
    Stop(#[from] StopError),

    #[error("error accepting a connection: {0}")]
    Accept(#[source] io::Error),

    #[error("error reading from connection {id}: {source}")]
    Read {
        id: ConnectionId,
        #[source]
        source: io::Error,
    },

    #[error("error sending a packet: {0}")]
    Send(#[from] SendError),
}
