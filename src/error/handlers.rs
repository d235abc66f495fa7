//! Error handlers
//!
//! Classifies socket faults and logs the ones that get reported upward.

use std::io::{self, ErrorKind};

use log::error;

use crate::error::types::ServerError;

/// Handle a server error
pub fn handle_error(err: &ServerError) {
    error!("TCP Server Error: {}", err);
}

/// Returns true when an io error just means the peer is gone.
///
/// These are handled as ordinary disconnects; anything else is a fault.
pub fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
            | ErrorKind::UnexpectedEof
            | ErrorKind::NotConnected
            | ErrorKind::TimedOut
    )
}
