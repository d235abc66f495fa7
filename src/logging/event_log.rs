//! Durable event log
//!
//! Appends one `TYPE;yyyy.MM.dd HH:mm:ss;text` line per entry to a text file.
//! The log is a sink fed from the server's event stream; failing to write it
//! never affects connection handling.

use chrono::Local;
use log::{info, warn};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use crate::events::ServerEvent;

/// Severity of a log entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogType {
    Info,
    Warning,
    Error,
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogType::Info => write!(f, "Info"),
            LogType::Warning => write!(f, "Warning"),
            LogType::Error => write!(f, "Error"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
    console_output: bool,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>, console_output: bool) -> Self {
        Self {
            path: path.into(),
            console_output,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `text` to the log file, echoing it to the console logger when
    /// console output is enabled.
    pub async fn append(&self, text: &str, log_type: LogType) -> io::Result<()> {
        let timestamp = Local::now().format("%Y.%m.%d %H:%M:%S").to_string();
        if self.console_output {
            info!("{}: {} at {}", log_type, text, timestamp);
        }

        let line = format!("{};{};{}\n", log_type, timestamp, text);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }

    /// Returns every line of the log. A log that was never written is empty.
    pub async fn read_lines(&self) -> io::Result<Vec<String>> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => Ok(content.lines().map(str::to_string).collect()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e),
        }
    }
}

/// Renders an event as a log entry
pub fn describe(event: &ServerEvent) -> (String, LogType) {
    match event {
        ServerEvent::PacketReceived { id, length, .. } => (
            format!("Packet received from connection {} ({} bytes)", id, length),
            LogType::Info,
        ),
        ServerEvent::ConnectionChanged {
            id,
            address,
            is_connected: true,
        } => (
            format!("Client {} connected as {}", address.ip(), id),
            LogType::Info,
        ),
        ServerEvent::ConnectionChanged {
            id,
            address,
            is_connected: false,
        } => (
            format!("Client {} ({}) disconnected", address.ip(), id),
            LogType::Info,
        ),
        ServerEvent::Fault(err) => (err.to_string(), LogType::Error),
    }
}

/// Writes every event received on `events` to `log` until the stream ends.
pub async fn forward_events(mut events: mpsc::UnboundedReceiver<ServerEvent>, log: EventLog) {
    while let Some(event) = events.recv().await {
        let (text, log_type) = describe(&event);
        if let Err(e) = log.append(&text, log_type).await {
            warn!("Failed to write event log {}: {}", log.path().display(), e);
        }
    }
}
