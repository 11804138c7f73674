//! Probe scheduling.
//!
//! Each system owns at most one task: either the recurring probe timer
//! (`Active`) or the deferred resumption after a manual escalation
//! (`Suspended`). Every cancel bumps the schedule epoch before aborting the
//! task, and a timer only fires while its epoch is current, so a cancelled
//! timer can never invoke its probe again. Firings also hold the system's
//! [`Firing`] gate, and retirement waits on it, so a replaced system's probe
//! is never invoked after its replacement is installed.

use crate::error::ProbeError;
use crate::probe::{Completion, ErrorHandler};
use crate::registry::RegistryInner;
use crate::system::{lock, System, Transition};
use crate::types::SchedulePhase;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread::{self, ThreadId};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant, MissedTickBehavior};
use tracing::trace;

/// Scheduling state of one system.
#[derive(Debug)]
pub(crate) struct Schedule {
    phase: SchedulePhase,
    epoch: u64,
    task: Option<JoinHandle<()>>,
    /// Cumulative escalation backoff
    backoff: Duration,
    escalations: u32,
    /// Set once the system has been replaced or removed; never re-armed.
    retired: bool,
}

impl Schedule {
    pub(crate) fn new() -> Self {
        Self {
            phase: SchedulePhase::Stopped,
            epoch: 0,
            task: None,
            backoff: Duration::ZERO,
            escalations: 0,
            retired: false,
        }
    }

    pub(crate) fn phase(&self) -> SchedulePhase {
        self.phase
    }

    pub(crate) fn backoff(&self) -> Duration {
        self.backoff
    }

    pub(crate) fn escalations(&self) -> u32 {
        self.escalations
    }

    fn is_current(&self, epoch: u64) -> bool {
        !self.retired && self.epoch == epoch
    }

    fn stop(&mut self) {
        self.epoch += 1;
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.phase = SchedulePhase::Stopped;
    }
}

/// Gate held for the duration of every probe invocation.
#[derive(Debug, Default)]
pub(crate) struct Firing {
    gate: Mutex<()>,
    /// Thread currently inside a guarded invocation
    owner: Mutex<Option<ThreadId>>,
}

impl Firing {
    fn enter(&self) -> FiringGuard<'_> {
        let gate = lock(&self.gate);
        *lock(&self.owner) = Some(thread::current().id());
        FiringGuard {
            firing: self,
            _gate: gate,
        }
    }

    /// Block until no invocation is in flight. Returns at once when called
    /// from inside an invocation on this thread.
    fn wait(&self) {
        if *lock(&self.owner) == Some(thread::current().id()) {
            return;
        }
        drop(lock(&self.gate));
    }
}

struct FiringGuard<'a> {
    firing: &'a Firing,
    _gate: MutexGuard<'a, ()>,
}

impl Drop for FiringGuard<'_> {
    fn drop(&mut self) {
        *lock(&self.firing.owner) = None;
    }
}

/// How the first, immediate probe invocation reports.
pub(crate) enum Prime {
    /// Into the status path, like every scheduled invocation.
    Status,
    /// Into a caller-supplied error handler.
    Handler(ErrorHandler),
}

/// Invoke the probe once right away, then arm the recurring timer.
pub(crate) fn start(system: &Arc<System>, registry: &Weak<RegistryInner>, prime: Prime) {
    let epoch = lock(&system.schedule).epoch;

    let done = match prime {
        Prime::Status => completion(system, registry),
        Prime::Handler(handler) => Completion::for_handler(handler),
    };
    {
        let _firing = system.firing.enter();
        system.probe.probe(done);
    }

    // The prime may have escalated (or the system may have been replaced)
    // in the meantime; either way the timer is no longer ours to arm.
    let mut schedule = lock(&system.schedule);
    if schedule.is_current(epoch) {
        let first_tick = Instant::now() + system.config.interval;
        arm(&mut schedule, system, registry, first_tick);
    }
}

/// Stop the system's timer or pending resumption. Idempotent.
pub(crate) fn cancel(system: &System) {
    lock(&system.schedule).stop();
}

/// Stop the system for good, waiting out any probe invocation in flight.
pub(crate) fn retire(system: &System) {
    lock(&system.schedule).retired = true;
    cancel(system);
    system.firing.wait();
}

/// Suspend the recurring probe after a manually reported error.
///
/// Returns how long the probe stays suspended, or `None` if the system was
/// retired concurrently.
pub(crate) fn escalate(
    system: &Arc<System>,
    registry: &Weak<RegistryInner>,
    err: &ProbeError,
    now: Instant,
) -> Option<(Duration, Transition)> {
    let backoff = {
        let mut schedule = lock(&system.schedule);
        if schedule.retired {
            return None;
        }
        schedule.stop();
        schedule.escalations += 1;
        schedule.backoff += system.config.escalation_penalty;

        let resume_at = now + schedule.backoff;
        schedule.phase = SchedulePhase::Suspended { resume_at };
        schedule.task = Some(spawn_resume(system, registry, schedule.epoch, resume_at));
        schedule.backoff
    };

    let transition = system.record_escalation(err, now);
    Some((backoff, transition))
}

fn completion(system: &System, registry: &Weak<RegistryInner>) -> Completion {
    Completion::for_system(registry.clone(), system.name.clone(), system.generation)
}

/// Replace whatever task is running with a fresh recurring timer.
fn arm(schedule: &mut Schedule, system: &Arc<System>, registry: &Weak<RegistryInner>, first_tick: Instant) {
    schedule.stop();
    let epoch = schedule.epoch;

    let system_ref = system.clone();
    let registry = registry.clone();
    let interval = system.config.interval;

    let task = system.runtime.spawn(async move {
        let mut ticker = interval_at(first_tick, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let _firing = system_ref.firing.enter();
            if !lock(&system_ref.schedule).is_current(epoch) {
                break;
            }
            trace!(system = %system_ref.name, "probe tick");
            system_ref.probe.probe(completion(&system_ref, &registry));
        }
    });

    schedule.phase = SchedulePhase::Active;
    schedule.task = Some(task);
}

fn spawn_resume(
    system: &Arc<System>,
    registry: &Weak<RegistryInner>,
    epoch: u64,
    resume_at: Instant,
) -> JoinHandle<()> {
    let system = system.clone();
    let registry = registry.clone();

    system.runtime.clone().spawn(async move {
        sleep_until(resume_at).await;

        let mut schedule = lock(&system.schedule);
        if !schedule.is_current(epoch) {
            return;
        }
        // Detach our own handle so re-arming does not abort this task.
        drop(schedule.task.take());
        trace!(system = %system.name, "resuming probe after escalation");
        let first_tick = Instant::now() + system.config.interval;
        arm(&mut schedule, &system, &registry, first_tick);
    })
}
