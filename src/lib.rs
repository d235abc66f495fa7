//! RAX TCP Server
//!
//! Accepts many concurrent TCP clients, raises one event per completed read
//! and per connection change, and sends serialized payloads back to one or
//! all connected clients.

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod serializer;
pub mod server;

pub use client::ConnectionId;
pub use config::ServerConfig;
pub use error::{SendError, ServerError, StartError, StopError};
pub use events::ServerEvent;
pub use serializer::{JsonSerializer, PacketSerializer};
pub use server::Server;
