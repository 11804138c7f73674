//! The registry façade.

use crate::error::{ProbeError, RegistryError, Result};
use crate::probe::{ErrorHandler, Probe};
use crate::scheduler::{self, Prime};
use crate::sink::{DiagnosticSink, TracingSink};
use crate::system::{System, Transition};
use crate::types::{OverallStatus, StatusCode, StatusSnapshot, SystemConfig, SystemView};
use dashmap::DashMap;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};
use tokio::runtime::Handle;
use tokio::time::Instant;

/// Shared registry state. Probes only ever see it through a weak reference.
pub(crate) struct RegistryInner {
    systems: DashMap<String, Arc<System>>,
    sink: RwLock<Arc<dyn DiagnosticSink>>,
    generations: AtomicU64,
}

impl RegistryInner {
    fn sink(&self) -> Arc<dyn DiagnosticSink> {
        self.sink
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn get(&self, name: &str) -> Option<Arc<System>> {
        self.systems.get(name).map(|entry| entry.value().clone())
    }

    /// Apply a probe completion to the live registration of `name`.
    ///
    /// Completions for an unregistered name, or for a registration that has
    /// since been replaced, are logged and dropped.
    pub(crate) fn record_completion(
        &self,
        name: &str,
        generation: u64,
        result: std::result::Result<(), ProbeError>,
    ) {
        let sink = self.sink();

        let system = match self.get(name) {
            Some(system) if system.generation == generation => system,
            Some(_) => {
                sink.debug(&format!(
                    "systemcheck [ {} ]: discarding completion from a replaced registration",
                    name
                ));
                return;
            }
            None => {
                let outcome = match &result {
                    Ok(()) => "ok".to_string(),
                    Err(e) => e.to_string(),
                };
                sink.error(&format!(
                    "Heartbeat on [ {} ] not registered. Not recording issues. Outcome was: {}",
                    name, outcome
                ));
                return;
            }
        };

        if let Err(e) = &result {
            sink.error(&format!("systemcheck [ {} ]: {}", name, e));
        }

        let transition = system.record(result, Instant::now());
        log_transition(sink.as_ref(), name, transition);
    }
}

impl RegistryInner {
    fn report_manual_error(self: &Arc<Self>, name: &str, err: ProbeError) -> Result<()> {
        let sink = self.sink();

        let Some(system) = self.get(name) else {
            sink.error(&unregistered_manual_error(name, &err));
            return Err(RegistryError::not_found(name));
        };

        sink.error(&format!("systemcheck [ {} ]: {}", name, err));

        match scheduler::escalate(&system, &Arc::downgrade(self), &err, Instant::now()) {
            Some((backoff, transition)) => {
                log_transition(sink.as_ref(), name, transition);
                sink.warn(&format!(
                    "systemcheck [ {} ]: probe suspended for {:?} after manual error",
                    name, backoff
                ));
                Ok(())
            }
            // Replaced or removed between lookup and escalation.
            None => Err(RegistryError::not_found(name)),
        }
    }
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        let systems: Vec<Arc<System>> = self.systems.iter().map(|e| e.value().clone()).collect();
        for system in systems {
            scheduler::retire(&system);
        }
    }
}

fn unregistered_manual_error(name: &str, err: &ProbeError) -> String {
    format!(
        "Manual error on [ {} ] not recorded: system not registered. Err was: {}",
        name, err
    )
}

fn log_transition(sink: &dyn DiagnosticSink, name: &str, transition: Transition) {
    if !transition.changed() {
        return;
    }
    let msg = format!(
        "systemcheck [ {} ]: status {} -> {}",
        name, transition.from, transition.to
    );
    if transition.to == StatusCode::Unhealthy {
        sink.warn(&msg);
    } else {
        sink.debug(&msg);
    }
}

/// Registry of monitored systems.
///
/// Cloning is cheap; clones share the same systems.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<RegistryInner>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("systems", &self.inner.systems.len())
            .finish()
    }
}

impl Registry {
    /// Create an empty registry logging through `tracing`.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                systems: DashMap::new(),
                sink: RwLock::new(Arc::new(TracingSink)),
                generations: AtomicU64::new(0),
            }),
        }
    }

    /// Start monitoring `name`, replacing any previous registration.
    ///
    /// The probe is invoked once immediately, then every `config.interval`.
    /// Must be called from within a Tokio runtime.
    pub fn register(&self, name: impl Into<String>, config: SystemConfig, probe: impl Probe) -> Result<()> {
        self.install(name.into(), config, Arc::new(probe), Prime::Status)
    }

    /// Like [`register`](Self::register), but the immediate first invocation
    /// reports its error to `handler` instead of the system's status.
    /// Scheduled invocations report to the status as usual.
    pub fn register_with_error_callback(
        &self,
        name: impl Into<String>,
        config: SystemConfig,
        probe: impl Probe,
        handler: ErrorHandler,
    ) -> Result<()> {
        self.install(name.into(), config, Arc::new(probe), Prime::Handler(handler))
    }

    fn install(&self, name: String, config: SystemConfig, probe: Arc<dyn Probe>, prime: Prime) -> Result<()> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| RegistryError::NoRuntime)?;

        let generation = self.inner.generations.fetch_add(1, Ordering::Relaxed) + 1;
        let interval = config.interval;
        let system = Arc::new(System::new(name.clone(), generation, config, probe, runtime)?);

        // Never retire under a map shard lock; retirement waits on in-flight ticks.
        let replaced = self.inner.systems.insert(name.clone(), system.clone());

        let sink = self.inner.sink();
        if let Some(old) = replaced {
            scheduler::retire(&old);
            sink.debug(&format!("SystemCheck replaced previous registration of {}", name));
        }

        scheduler::start(&system, &Arc::downgrade(&self.inner), prime);

        sink.debug(&format!(
            "SystemCheck started monitoring {} at an interval of {:?}",
            name, interval
        ));
        Ok(())
    }

    /// Stop monitoring `name` and forget its state.
    pub fn unregister(&self, name: &str) -> Result<()> {
        match self.inner.systems.remove(name) {
            Some((_, system)) => {
                scheduler::retire(&system);
                self.inner
                    .sink()
                    .debug(&format!("SystemCheck stopped monitoring {}", name));
                Ok(())
            }
            None => Err(RegistryError::not_found(name)),
        }
    }

    /// Stop every timer and clear the registry.
    pub fn shutdown(&self) {
        let names: Vec<String> = self.inner.systems.iter().map(|e| e.key().clone()).collect();
        for name in names {
            if let Some((_, system)) = self.inner.systems.remove(&name) {
                scheduler::retire(&system);
            }
        }
        self.inner.sink().debug("SystemCheck shut down");
    }

    /// Read-only view of every registered system.
    pub fn get_all(&self) -> HashMap<String, SystemView> {
        self.systems()
            .into_iter()
            .map(|system| (system.name.clone(), system.view()))
            .collect()
    }

    /// Stored status of one system.
    pub fn status(&self, name: &str) -> Result<StatusSnapshot> {
        self.inner
            .get(name)
            .map(|system| system.snapshot())
            .ok_or_else(|| RegistryError::not_found(name))
    }

    /// Re-derive every system's status and fold them into a summary.
    pub fn overall_status(&self) -> OverallStatus {
        let now = Instant::now();
        let systems: BTreeMap<String, StatusSnapshot> = self
            .systems()
            .into_iter()
            .map(|system| (system.name.clone(), system.refresh(now)))
            .collect();
        OverallStatus::from_systems(systems)
    }

    /// Record an operator-reported error against `name`.
    ///
    /// Forces the system unhealthy and suspends its probe for a backoff that
    /// grows with every escalation. Fails with `NotFound`, after logging,
    /// when `name` is not registered; nothing is recorded in that case.
    pub fn report_manual_error(&self, name: &str, err: impl Into<ProbeError>) -> Result<()> {
        self.inner.report_manual_error(name, err.into())
    }

    /// Bind a reporting callback to `name`.
    ///
    /// See [`ErrorSink::report`] for how `handler` changes its behavior.
    pub fn error_sink(&self, name: impl Into<String>, handler: Option<ErrorHandler>) -> ErrorSink {
        ErrorSink {
            registry: Arc::downgrade(&self.inner),
            name: name.into(),
            handler,
        }
    }

    /// Replace the diagnostic sink.
    pub fn attach_logger(&self, sink: impl DiagnosticSink + 'static) {
        *self.inner.sink.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(sink);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.systems.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.inner.systems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.systems.is_empty()
    }

    /// Snapshot of the live systems, taken without holding map locks afterwards.
    fn systems(&self) -> Vec<Arc<System>> {
        self.inner.systems.iter().map(|e| e.value().clone()).collect()
    }
}

/// Callback bound to one system name, returned by [`Registry::error_sink`].
///
/// Holds the registry weakly, so a probe may capture its own sink. Once the
/// registry is gone every report behaves as if the name were unregistered.
#[derive(Clone)]
pub struct ErrorSink {
    registry: Weak<RegistryInner>,
    name: String,
    handler: Option<ErrorHandler>,
}

impl ErrorSink {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Escalate `err` against the bound system.
    ///
    /// With a handler, `err` is forwarded to it afterwards and the call
    /// succeeds even if the system is not registered. Without one the call
    /// fails loud: `NotFound` for an unknown system, otherwise the reported
    /// error itself is returned after being recorded.
    pub fn report(&self, err: impl Into<ProbeError>) -> Result<()> {
        let err = err.into();
        let outcome = match self.registry.upgrade() {
            Some(registry) => registry.report_manual_error(&self.name, err.clone()),
            None => {
                TracingSink.error(&unregistered_manual_error(&self.name, &err));
                Err(RegistryError::not_found(self.name.as_str()))
            }
        };

        match &self.handler {
            Some(handler) => {
                handler(err);
                Ok(())
            }
            None => {
                outcome?;
                Err(RegistryError::Probe(err))
            }
        }
    }
}

impl fmt::Debug for ErrorSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorSink")
            .field("name", &self.name)
            .field("handler", &self.handler.is_some())
            .finish()
    }
}
