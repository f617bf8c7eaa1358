//! matrix-irc-bridge - Matrix application service bridging rooms to IRC.

use matrix_irc_bridge::appservice;
use matrix_irc_bridge::config::{Config, validate};
use matrix_irc_bridge::irc::TcpConnector;
use matrix_irc_bridge::matrix::HttpMatrixClient;
use matrix_irc_bridge::{Bridge, metrics};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    if let Err(errors) = validate(&config) {
        for e in &errors {
            error!(error = %e, "Invalid configuration");
        }
        return Err(anyhow::anyhow!(
            "{} configuration error(s) in {config_path}",
            errors.len()
        ));
    }

    info!(
        homeserver = %config.homeserver.url,
        domain = %config.homeserver.domain,
        servers = config.servers.len(),
        "Starting matrix-irc-bridge"
    );

    metrics::init();

    let matrix = Arc::new(HttpMatrixClient::from_config(&config)?);
    let bridge = Arc::new(Bridge::new(config, Arc::new(TcpConnector::default()), matrix));

    for (server_id, server) in bridge.config.servers.iter() {
        info!(
            server = %server_id,
            address = %server.address(),
            bot = %server.nick,
            mappings = server.rooms.mappings.len(),
            "IRC network configured"
        );
    }

    appservice::run_appservice(bridge).await?;

    Ok(())
}
