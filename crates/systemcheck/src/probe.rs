//! Probe contract.
//!
//! A probe is handed a [`Completion`] each time it is invoked and reports
//! through it once the check is done, from any thread and at any later
//! time. `Completion::complete` takes the handle by value, so a single
//! invocation can never report twice. A probe that drops its completion
//! (or holds it forever) simply never reports; the engine imposes no
//! timeout and the system keeps its previous status.

use crate::error::ProbeError;
use crate::registry::RegistryInner;
use async_trait::async_trait;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::trace;

/// Callback receiving errors outside the status path.
pub type ErrorHandler = Arc<dyn Fn(ProbeError) + Send + Sync>;

/// Periodic health probe for one system.
pub trait Probe: Send + Sync + 'static {
    /// Start a check and eventually report through `done`.
    fn probe(&self, done: Completion);
}

impl<F> Probe for F
where
    F: Fn(Completion) + Send + Sync + 'static,
{
    fn probe(&self, done: Completion) {
        self(done)
    }
}

/// Async health check.
#[async_trait]
pub trait HealthChecker: Send + Sync {
    /// Perform a health check
    async fn check(&self) -> Result<(), ProbeError>;

    /// Get the name of this checker
    fn name(&self) -> &str;
}

/// Adapts a [`HealthChecker`] into a [`Probe`] by spawning each check on
/// the current Tokio runtime.
pub struct CheckerProbe<C> {
    checker: Arc<C>,
}

impl<C: HealthChecker + 'static> CheckerProbe<C> {
    pub fn new(checker: C) -> Self {
        Self {
            checker: Arc::new(checker),
        }
    }

    pub fn from_arc(checker: Arc<C>) -> Self {
        Self { checker }
    }
}

impl<C: HealthChecker + 'static> Probe for CheckerProbe<C> {
    fn probe(&self, done: Completion) {
        let checker = self.checker.clone();
        tokio::spawn(async move {
            let result = checker.check().await;
            trace!(checker = checker.name(), ok = result.is_ok(), "check finished");
            done.complete(result);
        });
    }
}

enum Target {
    /// Feed the result into a registered system's status.
    System {
        registry: Weak<RegistryInner>,
        name: String,
        generation: u64,
    },
    /// Hand errors to a caller-supplied function instead.
    Handler(ErrorHandler),
}

/// Single-use handle a probe reports its outcome through.
pub struct Completion {
    target: Target,
}

impl Completion {
    pub(crate) fn for_system(registry: Weak<RegistryInner>, name: String, generation: u64) -> Self {
        Self {
            target: Target::System {
                registry,
                name,
                generation,
            },
        }
    }

    pub(crate) fn for_handler(handler: ErrorHandler) -> Self {
        Self {
            target: Target::Handler(handler),
        }
    }

    /// Report the outcome of this invocation.
    pub fn complete(self, result: Result<(), ProbeError>) {
        match self.target {
            Target::System {
                registry,
                name,
                generation,
            } => match registry.upgrade() {
                Some(registry) => registry.record_completion(&name, generation, result),
                None => trace!(system = %name, "registry dropped, discarding completion"),
            },
            Target::Handler(handler) => {
                if let Err(e) = result {
                    handler(e);
                }
            }
        }
    }

    /// Report success.
    pub fn succeed(self) {
        self.complete(Ok(()))
    }

    /// Report failure.
    pub fn fail(self, err: impl Into<ProbeError>) {
        self.complete(Err(err.into()))
    }

    /// Name of the system this completion reports to, if any.
    pub fn system(&self) -> Option<&str> {
        match &self.target {
            Target::System { name, .. } => Some(name),
            Target::Handler(_) => None,
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Target::System {
                name, generation, ..
            } => f
                .debug_struct("Completion")
                .field("system", name)
                .field("generation", generation)
                .finish(),
            Target::Handler(_) => f.debug_struct("Completion").field("handler", &true).finish(),
        }
    }
}
