use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use anyhow::Context;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use super::{
    SchedulerConfig,
    sweep::ReconciliationSweep,
    timer_table::{ScheduledTask, ScheduledTimer, TimerSnapshot, TimerTable},
};
use crate::{
    clock::Clock,
    models::{NewReminder, Reminder, ReminderId},
    notification::NotificationSender,
    storage::ReminderStorage,
};

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The other trigger path claimed this occurrence first.
    AlreadyClaimed,
    Dispatched {
        notified: bool,
        next: Option<Reminder>,
    },
}

struct SchedulerInner {
    storage: Arc<dyn ReminderStorage>,
    sender: Arc<dyn NotificationSender>,
    clock: Arc<dyn Clock>,
    config: SchedulerConfig,
    timers: Mutex<TimerTable>,
    sweep: Mutex<Option<ScheduledTask>>,
}

/// Turns persisted reminders into timers and delivered notifications.
///
/// Construct one per process and share clones of it. Both the timers and the
/// [`ReconciliationSweep`] hand due reminders to [`SchedulerService::dispatch`], which
/// claims an occurrence by deleting its record; only the caller whose delete removed
/// the row goes on to notify and re-enqueue.
#[derive(Clone)]
pub struct SchedulerService {
    inner: Arc<SchedulerInner>,
}

impl SchedulerService {
    pub fn new(
        storage: Arc<dyn ReminderStorage>,
        sender: Arc<dyn NotificationSender>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                storage,
                sender,
                clock,
                config,
                timers: Mutex::new(TimerTable::default()),
                sweep: Mutex::new(None),
            }),
        }
    }

    /// Builds the service, restores timers from storage and starts the sweep.
    pub async fn start(
        storage: Arc<dyn ReminderStorage>,
        sender: Arc<dyn NotificationSender>,
        clock: Arc<dyn Clock>,
        config: SchedulerConfig,
    ) -> Self {
        let service = Self::new(storage, sender, clock, config);
        service.restart_scheduled_reminders().await;

        let cancellation_token = CancellationToken::new();
        let sweep_handle =
            ReconciliationSweep::new(service.clone()).spawn(cancellation_token.child_token());
        *service.lock_sweep() = Some(ScheduledTask::new(sweep_handle, cancellation_token));

        log::info!(
            "Scheduler started [timezone = {}, sweep_interval = {:?}]",
            service.inner.config.tz,
            service.inner.config.sweep_interval
        );
        service
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    pub(super) fn clock(&self) -> &dyn Clock {
        self.inner.clock.as_ref()
    }

    pub(super) fn storage(&self) -> &dyn ReminderStorage {
        self.inner.storage.as_ref()
    }

    /// Registers a timer for the reminder's fire instant. Returns `false` without
    /// touching the timer table when that instant is not strictly in the future.
    pub fn schedule_reminder(&self, reminder: Reminder) -> bool {
        let id = reminder.id;
        let now = self.inner.clock.now();
        let fire_at = reminder.fire_instant(self.inner.config.tz);

        let Ok(delay_std) = (fire_at - now).to_std() else {
            log::debug!(
                "Not scheduling reminder in the past [reminder_id = {}, fire_at = {}]",
                id,
                fire_at
            );
            return false;
        };
        if delay_std.is_zero() {
            log::debug!("Not scheduling reminder due right now [reminder_id = {}]", id);
            return false;
        }

        let cancellation_token = CancellationToken::new();
        let task_handle = self.spawn_timer(reminder, delay_std, cancellation_token.child_token());
        let timer = ScheduledTimer {
            reminder_id: id,
            fire_at,
            delay: fire_at - now,
            task: ScheduledTask::new(task_handle, cancellation_token),
        };

        self.lock_timers().insert(timer);
        log::info!(
            "[SCHEDULE] Sleeping for {:?} delay. [reminder_id = {}, fire_at = {}]",
            delay_std,
            id,
            fire_at
        );
        true
    }

    pub fn update_reminder(&self, reminder: Reminder) -> bool {
        self.cancel_reminder(reminder.id);
        self.schedule_reminder(reminder)
    }

    /// Drops the timer for `id` if there is one. Unknown ids are a no-op.
    pub fn cancel_reminder(&self, id: ReminderId) {
        if self.lock_timers().cancel(id) {
            log::info!("Cancelled timer [reminder_id = {}]", id);
        }
    }

    /// Re-registers timers for every reminder still ahead of us. Reminders that came due
    /// while the process was down are dropped unless they fall inside the configured
    /// grace window, in which case they are dispatched right away.
    pub async fn restart_scheduled_reminders(&self) -> usize {
        let tz = self.inner.config.tz;
        let now = self.inner.clock.now();
        let load_from = now
            .checked_sub_signed(self.inner.config.missed_grace)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);

        let reminders = match self.inner.storage.find_all_future_from(load_from).await {
            Ok(reminders) => reminders,
            Err(error) => {
                log::error!("Could not load reminders to reschedule. error = {:#}", error);
                return 0;
            }
        };

        let mut scheduled = 0;
        for reminder in reminders {
            if reminder.fire_instant(tz) < now {
                let id = reminder.id;
                log::warn!("Dispatching reminder missed while offline [reminder_id = {}]", id);
                if let Err(error) = self.dispatch(reminder).await {
                    log::error!("Could not dispatch missed reminder. error = {:#}", error);
                }
            } else if self.schedule_reminder(reminder) {
                scheduled += 1;
            }
        }

        log::info!("Restored {} reminder timers", scheduled);
        scheduled
    }

    /// Claims, notifies and re-enqueues one due occurrence.
    ///
    /// `Err` only when the claim itself could not be made; send failures and failures to
    /// persist the next occurrence are logged and reflected in the outcome.
    pub async fn dispatch(&self, reminder: Reminder) -> anyhow::Result<DispatchOutcome> {
        let id = reminder.id;
        let claimed = self
            .inner
            .storage
            .delete_if_present(id)
            .await
            .with_context(|| format!("Could not claim reminder {id}"))?;

        if !claimed {
            log::debug!("Reminder already handled [reminder_id = {}]", id);
            return Ok(DispatchOutcome::AlreadyClaimed);
        }

        self.lock_timers().cancel(id);

        let notified = match self.inner.sender.send(reminder.user_id, &reminder).await {
            Ok(()) => true,
            Err(error) => {
                log::warn!(
                    "Could not deliver reminder notification. error = {}, reminder_id = {}",
                    error,
                    id
                );
                false
            }
        };

        let next = self.enqueue_next_occurrence(&reminder).await;

        Ok(DispatchOutcome::Dispatched { notified, next })
    }

    pub fn timers(&self) -> Vec<TimerSnapshot> {
        self.lock_timers().snapshot()
    }

    pub fn has_live_timer(&self, id: ReminderId) -> bool {
        self.lock_timers().is_live(id)
    }

    pub(super) fn prune_finished_timers(&self) -> usize {
        self.lock_timers().prune_finished()
    }

    /// Stops the sweep and cancels every pending timer. Dispatches already in flight
    /// run to completion.
    pub async fn shutdown(&self) {
        let sweep = self.lock_sweep().take();
        if let Some(sweep) = sweep {
            sweep.cancel_and_wait(SHUTDOWN_TIMEOUT).await;
        }

        let timers = self.lock_timers().drain();
        let cancelled = timers.len();
        for timer in timers {
            timer.task.cancel();
        }

        log::info!("Scheduler stopped, cancelled {} timers", cancelled);
    }

    async fn enqueue_next_occurrence(&self, reminder: &Reminder) -> Option<Reminder> {
        let now = self.inner.clock.now();
        let (next, skipped) =
            NewReminder::next_occurrence_after(reminder, now, self.inner.config.tz)?;
        if skipped > 0 {
            log::warn!(
                "Skipped missed occurrences [previous_id = {}, skipped = {}]",
                reminder.id,
                skipped
            );
        }
        let attempts = self.inner.config.recurrence_insert_attempts.max(1);
        let mut backoff = self.inner.config.recurrence_retry_backoff;

        for attempt in 1..=attempts {
            match self.inner.storage.insert(next.clone()).await {
                Ok(created) => {
                    log::info!(
                        "Created next occurrence [reminder_id = {}, previous_id = {}, date = {}]",
                        created.id,
                        reminder.id,
                        created.date
                    );
                    self.schedule_reminder(created.clone());
                    return Some(created);
                }
                Err(error) if attempt < attempts => {
                    log::warn!(
                        "Could not store next occurrence, retrying in {:?}. \
                         error = {:#}, attempt = {}, previous_id = {}",
                        backoff,
                        error,
                        attempt,
                        reminder.id
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(error) => {
                    log::error!(
                        "Giving up on next occurrence. \
                         error = {:#}, attempts = {}, previous_id = {}",
                        error,
                        attempts,
                        reminder.id
                    );
                }
            }
        }

        None
    }

    fn spawn_timer(
        &self,
        reminder: Reminder,
        delay: Duration,
        cancellation_token: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let service = self.clone();
        tokio::spawn(async move {
            let id = reminder.id;
            tokio::select! {
                _ = cancellation_token.cancelled() => {
                    log::debug!("Timer was cancelled [reminder_id = {}]", id);
                },
                _ = tokio::time::sleep(delay) => {
                    if let Err(error) = service.dispatch(reminder).await {
                        log::error!(
                            "Timer dispatch failed. error = {:#}, reminder_id = {}",
                            error,
                            id
                        );
                    }
                }
            }
        })
    }

    fn lock_timers(&self) -> MutexGuard<'_, TimerTable> {
        self.inner
            .timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_sweep(&self) -> MutexGuard<'_, Option<ScheduledTask>> {
        self.inner
            .sweep
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
