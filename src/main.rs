//! deckgate: a local HTTP endpoint for scripting a flashcard application
//!
//! Each accepted connection carries exactly one request:
//! - Raw-socket framing of one HTTP/1.x request (Content-Length bodies)
//! - One handler call, one response, then the connection closes
//! - JSON action calls over POST, CORS preflight over OPTIONS
//! - Configuration via CLI arguments or TOML file

mod api;
mod config;
mod http;
mod runtime;

use api::{ActionRegistry, ApiHandler};
use config::Config;
use runtime::Server;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!(
        listen = %config.listen,
        workers = ?config.workers,
        max_connections = config.max_connections,
        api_version = config.api_version,
        "Starting deckgate"
    );

    let actions = ActionRegistry::with_builtins(config.api_version);
    let handler = Arc::new(ApiHandler::new(actions, config.api_version));

    let server = Server::new(config, handler).start()?;
    info!(addr = %server.local_addr(), "Listening");
    server.wait();

    Ok(())
}
