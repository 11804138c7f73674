//! Systemcheck server
//!
//! Runs a [`systemcheck::Registry`] over systems declared in YAML and
//! exposes it over HTTP:
//!
//! - `GET /status`: every system plus the aggregate code (503 while any
//!   system is unhealthy)
//! - `GET /status/:name`: one system
//! - `POST /status/:name/errors`: report a manual error
//! - `GET /metrics`: Prometheus text format

pub mod checkers;
pub mod config;
pub mod http_server;
pub mod metrics;
pub mod server;

pub use config::{Config, ConfigError};
pub use http_server::{AppState, StatusServer, router};
pub use metrics::MetricsRegistry;
pub use server::SystemcheckServer;
