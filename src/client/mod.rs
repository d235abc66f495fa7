//! Client management system
//!
//! Handles per-connection resources, the live client registry and the
//! read/write cycles that drive each connection.

pub mod handle;
pub mod handler;
pub mod registry;

pub use handle::{ConnectionHandle, ConnectionId, Packet, ReceiveBuffer};
pub use handler::{read_cycle, write_cycle};
pub use registry::{ClientRegistry, RegistryGuard};
