//! Registry types and structures.

use crate::error::{RegistryError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, SystemTime};
use tokio::time::Instant;

/// Default span of time in which buffered errors count as recent.
pub const DEFAULT_THRESHOLD_WINDOW: Duration = Duration::from_secs(5 * 60);

/// Default error buffer capacity.
pub const DEFAULT_BUFFER_SIZE: usize = 5;

/// Default backoff added by each manual escalation.
pub const DEFAULT_ESCALATION_PENALTY: Duration = Duration::from_secs(5 * 60);

/// Derived status of a system.
///
/// Serialized as its numeric code so that summed codes stay meaningful to
/// dashboards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    /// No probe has completed yet
    Starting,
    /// Fewer recent errors than the buffer size
    Healthy,
    /// Error buffer full of recent errors, or manually escalated
    Unhealthy,
}

impl StatusCode {
    /// Numeric code: -1, 0 or 1.
    pub fn code(self) -> i64 {
        match self {
            StatusCode::Starting => -1,
            StatusCode::Healthy => 0,
            StatusCode::Unhealthy => 1,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            -1 => Some(StatusCode::Starting),
            0 => Some(StatusCode::Healthy),
            1 => Some(StatusCode::Unhealthy),
            _ => None,
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusCode::Starting => write!(f, "STARTING"),
            StatusCode::Healthy => write!(f, "HEALTHY"),
            StatusCode::Unhealthy => write!(f, "UNHEALTHY"),
        }
    }
}

impl Serialize for StatusCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.code())
    }
}

impl<'de> Deserialize<'de> for StatusCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let code = i64::deserialize(deserializer)?;
        StatusCode::from_code(code)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown status code {}", code)))
    }
}

/// One recorded failure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    /// Error message as reported by the probe
    pub message: String,

    /// Wall-clock time the error was recorded
    #[serde(with = "humantime_serde")]
    pub occurred_at: SystemTime,

    /// Monotonic timestamp used for threshold window arithmetic
    #[serde(skip)]
    pub recorded_at: Instant,
}

impl ErrorRecord {
    /// Record a failure happening now.
    pub fn new(message: impl Into<String>) -> Self {
        Self::at(message, Instant::now())
    }

    /// Record a failure at a given monotonic instant.
    pub fn at(message: impl Into<String>, recorded_at: Instant) -> Self {
        Self {
            message: message.into(),
            occurred_at: SystemTime::now(),
            recorded_at,
        }
    }
}

/// Per-system configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Interval between probe invocations
    #[serde(with = "humantime_serde")]
    pub interval: Duration,

    /// Span in which errors count towards the threshold
    #[serde(with = "humantime_serde", default = "default_threshold_window")]
    pub threshold_window: Duration,

    /// Error buffer capacity, also the unhealthy threshold
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Backoff added on every manual escalation
    #[serde(with = "humantime_serde", default = "default_escalation_penalty")]
    pub escalation_penalty: Duration,
}

fn default_threshold_window() -> Duration {
    DEFAULT_THRESHOLD_WINDOW
}

fn default_buffer_size() -> usize {
    DEFAULT_BUFFER_SIZE
}

fn default_escalation_penalty() -> Duration {
    DEFAULT_ESCALATION_PENALTY
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            threshold_window: DEFAULT_THRESHOLD_WINDOW,
            buffer_size: DEFAULT_BUFFER_SIZE,
            escalation_penalty: DEFAULT_ESCALATION_PENALTY,
        }
    }
}

impl SystemConfig {
    /// Defaults with the given probe interval.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ..Self::default()
        }
    }

    pub fn with_threshold_window(mut self, window: Duration) -> Self {
        self.threshold_window = window;
        self
    }

    pub fn with_buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    pub fn with_escalation_penalty(mut self, penalty: Duration) -> Self {
        self.escalation_penalty = penalty;
        self
    }

    /// Reject configurations the scheduler cannot run.
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(RegistryError::config("interval must be greater than zero"));
        }
        if self.buffer_size == 0 {
            return Err(RegistryError::config("buffer_size must be at least 1"));
        }
        Ok(())
    }
}

/// Point-in-time status of one system
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub code: StatusCode,
    pub recent_errors: Vec<ErrorRecord>,
    pub starting: bool,
}

/// Aggregate over every registered system
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverallStatus {
    pub systems: BTreeMap<String, StatusSnapshot>,

    /// Sum of every system's numeric code. A coarse signal, not a status.
    pub overall_code: i64,

    /// True if any system has yet to complete a probe
    pub any_starting: bool,
}

impl OverallStatus {
    /// Fold per-system snapshots into a summary.
    pub fn from_systems(systems: BTreeMap<String, StatusSnapshot>) -> Self {
        let overall_code = systems.values().map(|s| s.code.code()).sum();
        let any_starting = systems.values().any(|s| s.starting);
        Self {
            systems,
            overall_code,
            any_starting,
        }
    }

    /// Names of systems currently unhealthy.
    pub fn unhealthy(&self) -> impl Iterator<Item = &str> {
        self.systems
            .iter()
            .filter(|(_, s)| s.code == StatusCode::Unhealthy)
            .map(|(name, _)| name.as_str())
    }
}

/// Scheduler phase of a system
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulePhase {
    /// Recurring probe timer armed
    Active,
    /// Timer suspended after a manual escalation
    Suspended { resume_at: Instant },
    /// Cancelled
    Stopped,
}

/// Read-only view of a registered system
#[derive(Debug, Clone)]
pub struct SystemView {
    pub name: String,
    pub config: SystemConfig,
    pub status: StatusSnapshot,
    pub phase: SchedulePhase,

    /// Cumulative manual-escalation backoff
    pub backoff: Duration,

    /// Manual escalations since registration
    pub escalations: u32,
}
