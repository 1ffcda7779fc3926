use chrono::TimeDelta;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{DispatchOutcome, SchedulerService};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub dispatched: usize,
    pub already_claimed: usize,
    /// Not yet due and had no live timer, so a timer was registered for them.
    pub adopted: usize,
    pub failed: usize,
    pub pruned: usize,
}

/// Periodic backstop for reminders that are stored but have no live timer.
pub struct ReconciliationSweep {
    service: SchedulerService,
}

impl ReconciliationSweep {
    pub fn new(service: SchedulerService) -> Self {
        Self { service }
    }

    pub fn spawn(self, cancellation_token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.service.config().sweep_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately and restart has just run.
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = cancellation_token.cancelled() => {
                        log::info!("Reconciliation sweep stopped");
                        return;
                    },
                    _ = interval.tick() => {
                        let report = self.run_once().await;
                        if report != SweepReport::default() {
                            log::info!("Sweep finished. {:?}", report);
                        }
                    }
                }
            }
        })
    }

    /// One tick: looks at reminders firing in `[now, now + interval]`, dispatches the
    /// ones that are due and registers timers for the rest when they lack one.
    pub async fn run_once(&self) -> SweepReport {
        let mut report = SweepReport {
            pruned: self.service.prune_finished_timers(),
            ..SweepReport::default()
        };

        let config = self.service.config();
        let window = TimeDelta::from_std(config.sweep_interval).unwrap_or(TimeDelta::MAX);
        let now = self.service.clock().now();
        let end = now.checked_add_signed(window).unwrap_or(now);

        let candidates = match self.service.storage().find_due_between(now, end).await {
            Ok(candidates) => candidates,
            Err(error) => {
                log::error!("Sweep could not query due reminders. error = {:#}", error);
                return report;
            }
        };

        for reminder in candidates {
            let id = reminder.id;
            if reminder.fire_instant(config.tz) <= self.service.clock().now() {
                match self.service.dispatch(reminder).await {
                    Ok(DispatchOutcome::Dispatched { .. }) => {
                        log::info!("Sweep dispatched reminder [reminder_id = {}]", id);
                        report.dispatched += 1;
                    }
                    Ok(DispatchOutcome::AlreadyClaimed) => report.already_claimed += 1,
                    Err(error) => {
                        log::error!(
                            "Sweep dispatch failed. error = {:#}, reminder_id = {}",
                            error,
                            id
                        );
                        report.failed += 1;
                    }
                }
            } else if !self.service.has_live_timer(id) && self.service.schedule_reminder(reminder) {
                log::warn!("Sweep adopted reminder without a timer [reminder_id = {}]", id);
                report.adopted += 1;
            }
        }

        report
    }
}
