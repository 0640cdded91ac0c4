use std::sync::Arc;

use jamroom_session::{LogSink, ServerConfig, SessionServer};
use log::info;

/// Apply `JAMROOM_BIND` and `JAMROOM_BLOCK_SIZE` over the defaults.
fn config_from_env() -> ServerConfig {
    let mut config = ServerConfig::default();
    if let Ok(addr) = std::env::var("JAMROOM_BIND") {
        config.bind_addr = addr;
    }
    if let Ok(raw) = std::env::var("JAMROOM_BLOCK_SIZE") {
        match raw.parse() {
            Ok(block_size) => config.session.mixer.block_size = block_size,
            Err(e) => log::warn!("Ignoring JAMROOM_BLOCK_SIZE={raw}: {e}"),
        }
    }
    config
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let config = config_from_env();
    info!(
        "Starting jamroom on {} ({} samples/block at {} Hz)",
        config.bind_addr, config.session.mixer.block_size, config.session.mixer.sample_rate
    );

    let server = match SessionServer::new(config, Arc::new(LogSink)) {
        Ok(server) => server,
        Err(e) => {
            log::error!("Invalid configuration: {e}");
            std::process::exit(2);
        }
    };

    if let Err(e) = server.run().await {
        log::error!("Server error: {e}");
        std::process::exit(1);
    }
}
