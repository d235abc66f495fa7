//! RAX TCP Server - Entry Point

use log::{error, info};

use rax_tcp_server::error::handlers::handle_error;
use rax_tcp_server::logging::{self, EventLog, forward_events};
use rax_tcp_server::{Server, ServerConfig};

#[tokio::main]
async fn main() {
    logging::setup_logging();

    info!("Launching TCP server...");

    let config = match ServerConfig::load() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let event_log = EventLog::new(&config.event_log_path, config.console_output);
    let server = Server::new(config);
    tokio::spawn(forward_events(server.subscribe(), event_log));

    if let Err(e) = server.start().await {
        handle_error(&e);
        std::process::exit(1);
    }

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }

    info!("Shutting down...");
    if let Err(e) = server.stop().await {
        handle_error(&e);
    }
}
