//! Server core functionality
//!
//! This module contains the main server implementation and the state shared
//! between its accept loop and connection tasks.

pub mod core;
pub mod state;

pub use core::Server;
pub use state::ServerState;
