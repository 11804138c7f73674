//! Diagnostic output for the registry.

use tracing::{debug, error, warn};

/// Destination for the registry's diagnostic messages.
///
/// Swapped at runtime with [`Registry::attach_logger`](crate::Registry::attach_logger);
/// has no effect on scheduling or status.
#[cfg_attr(test, mockall::automock)]
pub trait DiagnosticSink: Send + Sync {
    fn debug(&self, msg: &str);
    fn warn(&self, msg: &str);
    fn error(&self, msg: &str);
}

/// Default sink: forwards to `tracing` under the `systemcheck` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn debug(&self, msg: &str) {
        debug!(target: "systemcheck", "{}", msg);
    }

    fn warn(&self, msg: &str) {
        warn!(target: "systemcheck", "{}", msg);
    }

    fn error(&self, msg: &str) {
        error!(target: "systemcheck", "{}", msg);
    }
}
