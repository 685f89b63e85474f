//! REST server command (`boardroom serve`).

use anyhow::{Context, Result};
use boardroom::config::BoardroomConfig;
use boardroom::server::{ServerConfig, start_server};

pub async fn cmd_serve(
    mut config: BoardroomConfig,
    port: Option<u16>,
    host: Option<String>,
    dev: bool,
) -> Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(host) = host {
        config.server.host = host;
    }
    config.validate().context("Invalid configuration")?;

    let server = ServerConfig {
        dev_mode: dev,
        ..ServerConfig::from_settings(&config.server)
    };
    start_server(&config, server).await
}
