//! Logging
//!
//! Console logging setup and the file-backed event log sink.

pub mod event_log;

pub use event_log::{EventLog, LogType, describe, forward_events};

/// Setup logging for the server. `RUST_LOG` overrides the default `info` level.
pub fn setup_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}
