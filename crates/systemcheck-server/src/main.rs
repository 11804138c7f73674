//! Systemcheck server binary

use common::logging::{self, LogFormat};
use systemcheck_server::{Config, SystemcheckServer};

#[tokio::main]
async fn main() -> common::Result<()> {
    // Logging is configured from the file, so it is not up yet
    let (config, load_error) = match Config::load() {
        Ok(cfg) => (cfg, None),
        Err(e) => (Config::default(), Some(e)),
    };

    let level = config.logging.level.as_deref().unwrap_or("info");
    logging::init_with(level, LogFormat::parse(config.logging.format.as_deref()));

    if let Some(e) = load_error {
        tracing::warn!(error = %e, "Configuration error, using defaults");
    }

    tracing::info!(systems = config.systems.len(), "Systemcheck server starting");

    SystemcheckServer::new(config).run().await
}
