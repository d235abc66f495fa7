//! Configuration management for RAX TCP Server
//!
//! Settings come from `config.toml` (if present) with environment overrides
//! prefixed `RAX_TCP_`, e.g. `RAX_TCP_PORT=4100`.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::path::Path;

use crate::error::StartError;

/// Upper bound for the per-connection receive buffer
const MAX_RECEIVE_BUFFER_SIZE: usize = 16 * 1024 * 1024;

/// Complete server configuration
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    /// IP address the listener binds to
    pub bind_address: String,

    /// Listening port (0 lets the OS pick one)
    pub port: u16,

    /// Receive buffer capacity for each connection, in bytes.
    /// Also applied as SO_RCVBUF on the listening socket.
    pub receive_buffer_size: usize,

    /// Pending-connection backlog of the listener
    pub listen_backlog: u32,

    /// Disable Nagle's algorithm on accepted sockets
    pub nodelay: bool,

    /// File the event log forwarder appends to
    pub event_log_path: String,

    /// Echo event log lines to the console logger
    pub console_output: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 4000,
            receive_buffer_size: 8192,
            listen_backlog: 1024,
            nodelay: true,
            event_log_path: "log".to_string(),
            console_output: false,
        }
    }
}

impl ServerConfig {
    /// Load configuration from config.toml with environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        // Docker production path first, then local development
        let settings = Config::builder()
            .add_source(File::with_name("rax-tcp-server/config").required(false))
            .add_source(File::with_name("config").required(false))
            .add_source(Environment::with_prefix("RAX_TCP").try_parsing(true))
            .build()?;
        Self::from_settings(settings)
    }

    /// Load configuration from an explicit file, still honouring the environment
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path))
            .add_source(Environment::with_prefix("RAX_TCP").try_parsing(true))
            .build()?;
        Self::from_settings(settings)
    }

    fn from_settings(settings: Config) -> Result<Self, ConfigError> {
        let config: ServerConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Configuration listening on an explicit address and port
    pub fn with_endpoint(endpoint: SocketAddr) -> Self {
        Self {
            bind_address: endpoint.ip().to_string(),
            port: endpoint.port(),
            ..Self::default()
        }
    }

    /// Get bind address and port as socket address
    pub fn socket_addr(&self) -> Result<SocketAddr, StartError> {
        let ip: IpAddr = self
            .bind_address
            .parse()
            .map_err(|_| StartError::InvalidAddress(self.bind_address.clone()))?;
        Ok(SocketAddr::new(ip, self.port))
    }

    /// Validation for all configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bind_address.parse::<IpAddr>().is_err() {
            return Err(ConfigError::Message(format!(
                "bind_address '{}' is not an IP address",
                self.bind_address
            )));
        }

        if self.receive_buffer_size == 0 || self.receive_buffer_size > MAX_RECEIVE_BUFFER_SIZE {
            return Err(ConfigError::Message(format!(
                "receive_buffer_size must be between 1 and {MAX_RECEIVE_BUFFER_SIZE}"
            )));
        }

        if self.listen_backlog == 0 {
            return Err(ConfigError::Message(
                "listen_backlog must be greater than 0".into(),
            ));
        }

        if self.event_log_path.is_empty() {
            return Err(ConfigError::Message(
                "event_log_path cannot be empty".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.socket_addr().unwrap(),
            "127.0.0.1:4000".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut config = ServerConfig::default();
        config.receive_buffer_size = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.bind_address = "not-an-ip".into();
        assert!(config.validate().is_err());
        assert!(matches!(
            config.socket_addr(),
            Err(StartError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_port_zero_is_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "port = 0\n").unwrap();

        let config = ServerConfig::load_from(&path).unwrap();
        assert_eq!(config.socket_addr().unwrap().port(), 0);
    }

    #[test]
    fn test_with_endpoint() {
        let endpoint: SocketAddr = "0.0.0.0:4321".parse().unwrap();
        let config = ServerConfig::with_endpoint(endpoint);
        assert_eq!(config.bind_address, "0.0.0.0");
        assert_eq!(config.socket_addr().unwrap(), endpoint);
        assert_eq!(config.receive_buffer_size, 8192);
    }

    #[test]
    fn test_load_from_file_fills_missing_keys_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "port = 4555").unwrap();
        writeln!(file, "receive_buffer_size = 1024").unwrap();
        drop(file);

        let config = ServerConfig::load_from(&path).unwrap();
        assert_eq!(config.port, 4555);
        assert_eq!(config.receive_buffer_size, 1024);
        assert_eq!(config.bind_address, "127.0.0.1");
    }

    #[test]
    fn test_load_from_file_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "listen_backlog = 0\n").unwrap();

        assert!(ServerConfig::load_from(&path).is_err());
    }
}
