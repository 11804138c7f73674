//! Per-system record.

use crate::error::{ProbeError, Result};
use crate::probe::Probe;
use crate::ring_buffer::RingBuffer;
use crate::scheduler::{Firing, Schedule};
use crate::status::{self, StatusInputs};
use crate::types::{ErrorRecord, SchedulePhase, StatusCode, StatusSnapshot, SystemConfig, SystemView};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::runtime::Handle;
use tokio::time::Instant;

/// Lock a mutex, recovering the data if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Mutable health state of a system.
struct HealthState {
    errors: RingBuffer<ErrorRecord>,
    status: StatusCode,
    starting: bool,
}

/// A registered system.
///
/// `state` and `schedule` are separate locks and are never held together.
pub(crate) struct System {
    pub(crate) name: String,
    /// Distinguishes this registration from earlier ones under the same name.
    pub(crate) generation: u64,
    pub(crate) config: SystemConfig,
    pub(crate) probe: Arc<dyn Probe>,
    /// Runtime the system's timers are spawned on.
    pub(crate) runtime: Handle,
    state: Mutex<HealthState>,
    pub(crate) schedule: Mutex<Schedule>,
    /// Held across each probe invocation; see [`Firing`].
    pub(crate) firing: Firing,
}

/// Status before and after an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Transition {
    pub(crate) from: StatusCode,
    pub(crate) to: StatusCode,
}

impl Transition {
    pub(crate) fn changed(self) -> bool {
        self.from != self.to
    }
}

impl System {
    pub(crate) fn new(
        name: String,
        generation: u64,
        config: SystemConfig,
        probe: Arc<dyn Probe>,
        runtime: Handle,
    ) -> Result<Self> {
        let errors = RingBuffer::new(config.buffer_size)?;
        Ok(Self {
            name,
            generation,
            config,
            probe,
            runtime,
            state: Mutex::new(HealthState {
                errors,
                status: StatusCode::Starting,
                starting: true,
            }),
            schedule: Mutex::new(Schedule::new()),
            firing: Firing::default(),
        })
    }

    pub(crate) fn phase(&self) -> SchedulePhase {
        lock(&self.schedule).phase()
    }

    /// Apply a probe completion and re-derive the status.
    pub(crate) fn record(&self, result: std::result::Result<(), ProbeError>, now: Instant) -> Transition {
        let phase = self.phase();
        let mut state = lock(&self.state);
        let from = state.status;

        if let Err(e) = result {
            state.errors.push(ErrorRecord::at(e.message(), now));
        }
        state.starting = false;
        state.status = self.derive(&state, phase, now);

        Transition {
            from,
            to: state.status,
        }
    }

    /// Record a manually reported error and force the system unhealthy.
    pub(crate) fn record_escalation(&self, err: &ProbeError, now: Instant) -> Transition {
        let mut state = lock(&self.state);
        let from = state.status;

        state.errors.push(ErrorRecord::at(err.message(), now));
        state.starting = false;
        state.status = StatusCode::Unhealthy;

        Transition {
            from,
            to: state.status,
        }
    }

    /// Re-derive the status at `now` and return a snapshot.
    pub(crate) fn refresh(&self, now: Instant) -> StatusSnapshot {
        let phase = self.phase();
        let mut state = lock(&self.state);
        state.status = self.derive(&state, phase, now);
        Self::snapshot_of(&state)
    }

    /// Stored status, without re-deriving.
    pub(crate) fn snapshot(&self) -> StatusSnapshot {
        Self::snapshot_of(&lock(&self.state))
    }

    pub(crate) fn view(&self) -> SystemView {
        let (phase, backoff, escalations) = {
            let schedule = lock(&self.schedule);
            (schedule.phase(), schedule.backoff(), schedule.escalations())
        };
        SystemView {
            name: self.name.clone(),
            config: self.config.clone(),
            status: self.snapshot(),
            phase,
            backoff,
            escalations,
        }
    }

    fn derive(&self, state: &HealthState, phase: SchedulePhase, now: Instant) -> StatusCode {
        status::derive(
            StatusInputs {
                errors: &state.errors,
                config: &self.config,
                starting: state.starting,
                phase,
            },
            now,
        )
    }

    fn snapshot_of(state: &HealthState) -> StatusSnapshot {
        StatusSnapshot {
            code: state.status,
            recent_errors: state.errors.contents(),
            starting: state.starting,
        }
    }
}
