mod service;
mod sweep;
mod timer_table;

use std::time::Duration;

use chrono::TimeDelta;
use chrono_tz::Tz;

pub use service::{DispatchOutcome, SchedulerService};
pub use sweep::{ReconciliationSweep, SweepReport};
pub use timer_table::TimerSnapshot;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// The single local zone fire instants are evaluated in.
    pub tz: Tz,
    pub sweep_interval: Duration,
    /// How far back a restart still fires reminders that were missed while offline.
    /// Zero drops them.
    pub missed_grace: TimeDelta,
    pub recurrence_insert_attempts: u32,
    pub recurrence_retry_backoff: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tz: chrono_tz::UTC,
            sweep_interval: Duration::from_secs(60),
            missed_grace: TimeDelta::zero(),
            recurrence_insert_attempts: 3,
            recurrence_retry_backoff: Duration::from_millis(500),
        }
    }
}
