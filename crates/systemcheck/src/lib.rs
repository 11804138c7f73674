//! Process-local health monitoring for named systems.
//!
//! Callers register systems (subsystems, dependencies, services) together
//! with a probe. The registry invokes each probe on a fixed interval,
//! keeps the most recent failures in a bounded buffer, and derives a
//! status per system and in aggregate:
//!
//! - `Starting` (-1) until the first probe completes
//! - `Unhealthy` (1) once the whole error buffer holds failures recorded
//!   inside the threshold window, or after a manual escalation
//! - `Healthy` (0) otherwise
//!
//! # Example
//!
//! ```no_run
//! use systemcheck::{Completion, Registry, SystemConfig};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Registry::new();
//!
//! registry.register(
//!     "search",
//!     SystemConfig::new(Duration::from_secs(10)).with_buffer_size(3),
//!     |done: Completion| {
//!         tokio::spawn(async move {
//!             // ping the cluster here
//!             done.succeed();
//!         });
//!     },
//! )?;
//!
//! let overall = registry.overall_status();
//! println!("overall code {} (starting: {})", overall.overall_code, overall.any_starting);
//! # Ok(())
//! # }
//! ```
//!
//! # Manual escalation
//!
//! [`Registry::report_manual_error`] records an operator-asserted failure,
//! forces the system unhealthy and suspends its probe. Each escalation adds
//! `escalation_penalty` to a cumulative backoff, so repeated reports keep
//! the scheduled probe from immediately overwriting the asserted state.

pub mod error;
pub mod probe;
pub mod registry;
pub mod ring_buffer;
mod scheduler;
pub mod sink;
pub mod status;
mod system;
pub mod types;

pub use error::{ProbeError, RegistryError, Result};
pub use probe::{CheckerProbe, Completion, ErrorHandler, HealthChecker, Probe};
pub use registry::{ErrorSink, Registry};
pub use ring_buffer::RingBuffer;
pub use sink::{DiagnosticSink, TracingSink};
pub use types::{
    ErrorRecord, OverallStatus, SchedulePhase, StatusCode, StatusSnapshot, SystemConfig, SystemView,
};

use std::sync::OnceLock;

/// Process-wide registry, created on first use and never torn down.
///
/// Prefer [`Registry::new`] wherever isolation matters, such as tests.
pub fn global() -> &'static Registry {
    static GLOBAL: OnceLock<Registry> = OnceLock::new();
    GLOBAL.get_or_init(Registry::new)
}
