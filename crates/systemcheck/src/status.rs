//! Status derivation from buffered errors.
//!
//! A system turns unhealthy only once its whole error buffer is populated
//! with errors recorded inside the threshold window. Until the buffer has
//! filled at least once, early failures cannot flip the status.

use crate::ring_buffer::RingBuffer;
use crate::types::{ErrorRecord, SchedulePhase, StatusCode, SystemConfig};
use tokio::time::Instant;

/// Inputs the engine needs to derive a status.
#[derive(Debug, Clone, Copy)]
pub struct StatusInputs<'a> {
    pub errors: &'a RingBuffer<ErrorRecord>,
    pub config: &'a SystemConfig,
    /// True until the first probe completion
    pub starting: bool,
    pub phase: SchedulePhase,
}

/// Number of buffered errors recorded at or after `now - window`.
pub fn recent_error_count(
    errors: &RingBuffer<ErrorRecord>,
    config: &SystemConfig,
    now: Instant,
) -> usize {
    match now.checked_sub(config.threshold_window) {
        Some(window_start) => errors
            .iter()
            .filter(|record| record.recorded_at >= window_start)
            .count(),
        // Window reaches back past the clock origin: everything is recent.
        None => errors.len(),
    }
}

/// Derive the status code at `now`. Pure; safe to call repeatedly.
pub fn derive(inputs: StatusInputs<'_>, now: Instant) -> StatusCode {
    if inputs.starting {
        return StatusCode::Starting;
    }

    if let SchedulePhase::Suspended { resume_at } = inputs.phase {
        if now < resume_at {
            return StatusCode::Unhealthy;
        }
    }

    if recent_error_count(inputs.errors, inputs.config, now) >= inputs.config.buffer_size {
        StatusCode::Unhealthy
    } else {
        StatusCode::Healthy
    }
}
