use std::{collections::HashMap, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use tokio::{task::JoinHandle, time};
use tokio_util::sync::CancellationToken;

use crate::models::ReminderId;

pub struct ScheduledTask {
    task_handle: JoinHandle<()>,
    cancellation_token: CancellationToken,
}

impl ScheduledTask {
    pub fn new(task_handle: JoinHandle<()>, cancellation_token: CancellationToken) -> Self {
        Self {
            task_handle,
            cancellation_token,
        }
    }

    /// Signals the task without waiting for it. A task already past its timer keeps
    /// running to completion.
    pub fn cancel(self) {
        self.cancellation_token.cancel();
    }

    pub async fn cancel_and_wait(self, timeout: Duration) {
        self.cancellation_token.cancel();
        let cancel_with_timeout = time::timeout(timeout, self.task_handle);
        let _ = cancel_with_timeout.await;
    }

    pub fn is_finished(&self) -> bool {
        self.task_handle.is_finished()
    }
}

pub struct ScheduledTimer {
    pub reminder_id: ReminderId,
    pub fire_at: DateTime<Utc>,
    pub delay: TimeDelta,
    pub task: ScheduledTask,
}

/// Read-only view of a registered timer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerSnapshot {
    pub reminder_id: ReminderId,
    pub fire_at: DateTime<Utc>,
    pub delay: TimeDelta,
}

/// In-memory reminder id to timer mapping. Holds no persisted state.
#[derive(Default)]
pub struct TimerTable {
    timers: HashMap<ReminderId, ScheduledTimer>,
}

impl TimerTable {
    /// Registers `timer`, cancelling whatever was registered for the same reminder.
    pub fn insert(&mut self, timer: ScheduledTimer) {
        if let Some(previous) = self.timers.insert(timer.reminder_id, timer) {
            previous.task.cancel();
        }
    }

    /// Idempotent; returns whether an entry was removed.
    pub fn cancel(&mut self, id: ReminderId) -> bool {
        match self.timers.remove(&id) {
            Some(timer) => {
                timer.task.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_live(&self, id: ReminderId) -> bool {
        self.timers
            .get(&id)
            .is_some_and(|timer| !timer.task.is_finished())
    }

    pub fn prune_finished(&mut self) -> usize {
        let before = self.timers.len();
        self.timers.retain(|_, timer| !timer.task.is_finished());
        before - self.timers.len()
    }

    pub fn drain(&mut self) -> Vec<ScheduledTimer> {
        self.timers.drain().map(|(_, timer)| timer).collect()
    }

    pub fn snapshot(&self) -> Vec<TimerSnapshot> {
        let mut snapshot: Vec<_> = self
            .timers
            .values()
            .map(|timer| TimerSnapshot {
                reminder_id: timer.reminder_id,
                fire_at: timer.fire_at,
                delay: timer.delay,
            })
            .collect();
        snapshot.sort_by_key(|timer| (timer.fire_at, timer.reminder_id));
        snapshot
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    };

    use chrono::TimeZone;

    use super::*;

    fn timer(id: ReminderId, hits: Arc<AtomicBool>, delay: Duration) -> ScheduledTimer {
        let token = CancellationToken::new();
        let task_token = token.child_token();
        let task_handle = tokio::spawn(async move {
            tokio::select! {
                _ = task_token.cancelled() => {},
                _ = tokio::time::sleep(delay) => hits.store(true, Ordering::SeqCst),
            }
        });

        ScheduledTimer {
            reminder_id: id,
            fire_at: Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
            delay: TimeDelta::from_std(delay).unwrap(),
            task: ScheduledTask::new(task_handle, token),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn insert_replaces_and_cancels_previous_timer() {
        let mut table = TimerTable::default();
        let first = Arc::new(AtomicBool::new(false));
        let second = Arc::new(AtomicBool::new(false));

        table.insert(timer(1, Arc::clone(&first), Duration::from_secs(10)));
        table.insert(timer(1, Arc::clone(&second), Duration::from_secs(20)));
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(table.len(), 1);
        assert!(!first.load(Ordering::SeqCst));
        assert!(second.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_is_idempotent() {
        let mut table = TimerTable::default();
        let hit = Arc::new(AtomicBool::new(false));
        table.insert(timer(1, Arc::clone(&hit), Duration::from_secs(10)));

        assert!(table.cancel(1));
        assert!(!table.cancel(1));
        assert!(!table.cancel(42));
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert!(table.is_empty());
        assert!(!hit.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn finished_timers_are_not_live_and_get_pruned() {
        let mut table = TimerTable::default();
        table.insert(timer(1, Arc::new(AtomicBool::new(false)), Duration::from_secs(10)));
        table.insert(timer(2, Arc::new(AtomicBool::new(false)), Duration::from_secs(100)));

        tokio::time::sleep(Duration::from_secs(30)).await;

        assert!(!table.is_live(1));
        assert!(table.is_live(2));
        assert_eq!(table.prune_finished(), 1);
        assert_eq!(table.snapshot().len(), 1);
        assert_eq!(table.snapshot()[0].reminder_id, 2);
    }
}
