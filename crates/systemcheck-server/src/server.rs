//! Main systemcheck server implementation.

use crate::checkers::register_system;
use crate::config::Config;
use crate::http_server::{AppState, StatusServer};
use crate::metrics::MetricsRegistry;
use std::sync::Arc;
use systemcheck::Registry;
use tracing::{info, warn};

/// Systemcheck server
pub struct SystemcheckServer {
    config: Config,
    registry: Registry,
}

impl SystemcheckServer {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            registry: Registry::new(),
        }
    }

    /// Registry the server monitors through
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Register every configured system. Must run inside a Tokio runtime.
    pub fn register_systems(&self) -> systemcheck::Result<()> {
        for system in &self.config.systems {
            let config = system.to_system_config(&self.config.defaults);
            register_system(&self.registry, &system.name, config, &system.probe)?;
            info!(system = %system.name, interval = ?system.interval, "Registered system");
        }
        Ok(())
    }

    /// Run until ctrl-c
    pub async fn run(self) -> common::Result<()> {
        info!("Starting systemcheck server");
        self.register_systems().map_err(common::Error::registry)?;

        let state = AppState {
            registry: self.registry.clone(),
            metrics: Arc::new(MetricsRegistry::new()),
        };
        let server = StatusServer::new(state, self.config.http.listen_addr.clone());

        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received");
        };

        let result = server.run_until(shutdown).await.map_err(common::Error::server);
        self.registry.shutdown();
        info!("Systemcheck server stopped");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_register_systems_from_config() {
        let yaml = r#"
systems:
  - name: db
    interval: 1m
    probe: { type: tcp, address: "127.0.0.1:1", timeout: 50ms }
  - name: resolver
    interval: 1m
    buffer_size: 2
    probe: { type: dns, query: localhost }
"#;
        let server = SystemcheckServer::new(assert_ok!(Config::from_yaml(yaml)));
        assert_ok!(server.register_systems());

        let all = server.registry().get_all();
        assert_eq!(all.len(), 2);
        assert_eq!(all["resolver"].config.buffer_size, 2);
        assert_eq!(all["db"].config.buffer_size, 5);

        server.registry().shutdown();
        assert!(server.registry().is_empty());
    }

    #[test]
    fn test_register_requires_runtime() {
        let yaml = r#"
systems:
  - name: db
    interval: 1m
    probe: { type: tcp, address: "127.0.0.1:1" }
"#;
        let server = SystemcheckServer::new(assert_ok!(Config::from_yaml(yaml)));
        let err = assert_err!(server.register_systems());
        assert_eq!(err, systemcheck::RegistryError::NoRuntime);
    }
}
