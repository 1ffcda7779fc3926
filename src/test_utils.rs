use std::{
    collections::HashSet,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicU32, Ordering},
    },
};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use tokio::time::Instant;

use crate::{
    clock::Clock,
    models::{NewReminder, Reminder, ReminderId, ReminderTime, RepeatRule, UserId},
    notification::{NotificationError, NotificationSender},
    storage::{InMemoryReminderStorage, ReminderStorage},
};

/// Wall clock that follows tokio's (pausable) time, starting at 2025-03-01 08:00 UTC.
pub struct TokioClock {
    origin: DateTime<Utc>,
    started: Instant,
}

impl TokioClock {
    pub fn starting_at(origin: DateTime<Utc>) -> Self {
        Self {
            origin,
            started: Instant::now(),
        }
    }
}

impl Default for TokioClock {
    fn default() -> Self {
        Self::starting_at(Utc.with_ymd_and_hms(2025, 3, 1, 8, 0, 0).unwrap())
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        self.origin + TimeDelta::from_std(self.started.elapsed()).unwrap()
    }
}

#[derive(Default)]
pub struct CountingSender {
    sent: Mutex<Vec<ReminderId>>,
    failing: AtomicBool,
}

impl CountingSender {
    pub fn sent_ids(&self) -> Vec<ReminderId> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail_sends(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl NotificationSender for CountingSender {
    async fn send(&self, user_id: UserId, reminder: &Reminder) -> Result<(), NotificationError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(NotificationError::NoEmailConfigured(user_id));
        }
        self.sent.lock().unwrap().push(reminder.id);
        Ok(())
    }
}

/// In-memory storage with switchable failures.
pub struct FlakyReminderStorage {
    inner: InMemoryReminderStorage,
    failing_inserts: AtomicU32,
    insert_attempts: AtomicU32,
    failing_queries: AtomicBool,
    failing_deletes: Mutex<HashSet<ReminderId>>,
}

impl FlakyReminderStorage {
    pub fn new(tz: Tz) -> Self {
        Self {
            inner: InMemoryReminderStorage::new(tz),
            failing_inserts: AtomicU32::new(0),
            insert_attempts: AtomicU32::new(0),
            failing_queries: AtomicBool::new(false),
            failing_deletes: Mutex::new(HashSet::new()),
        }
    }

    pub fn fail_next_inserts(&self, count: u32) {
        self.failing_inserts.store(count, Ordering::SeqCst);
        self.insert_attempts.store(0, Ordering::SeqCst);
    }

    pub fn insert_attempts(&self) -> u32 {
        self.insert_attempts.load(Ordering::SeqCst)
    }

    pub fn fail_queries(&self, failing: bool) {
        self.failing_queries.store(failing, Ordering::SeqCst);
    }

    pub fn fail_deletes_of(&self, id: ReminderId) {
        self.failing_deletes.lock().unwrap().insert(id);
    }

    pub async fn get_all(&self) -> Vec<Reminder> {
        self.inner.get_all().await
    }

    fn check_queries(&self) -> anyhow::Result<()> {
        if self.failing_queries.load(Ordering::SeqCst) {
            anyhow::bail!("database is locked");
        }
        Ok(())
    }
}

#[async_trait]
impl ReminderStorage for FlakyReminderStorage {
    async fn get(&self, id: ReminderId) -> anyhow::Result<Option<Reminder>> {
        self.inner.get(id).await
    }

    async fn list_for_user(&self, user_id: UserId) -> anyhow::Result<Vec<Reminder>> {
        self.inner.list_for_user(user_id).await
    }

    async fn insert(&self, reminder: NewReminder) -> anyhow::Result<Reminder> {
        self.insert_attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failing_inserts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if failing {
            anyhow::bail!("disk I/O error");
        }
        self.inner.insert(reminder).await
    }

    async fn update(&self, reminder: Reminder) -> anyhow::Result<Reminder> {
        self.inner.update(reminder).await
    }

    async fn delete_if_present(&self, id: ReminderId) -> anyhow::Result<bool> {
        if self.failing_deletes.lock().unwrap().contains(&id) {
            anyhow::bail!("database is locked");
        }
        self.inner.delete_if_present(id).await
    }

    async fn find_due_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Reminder>> {
        self.check_queries()?;
        self.inner.find_due_between(start, end).await
    }

    async fn find_all_future_from(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<Reminder>> {
        self.check_queries()?;
        self.inner.find_all_future_from(now).await
    }
}

/// A reminder whose fire instant in UTC is `at`, truncated to the minute.
pub fn new_reminder_at(at: DateTime<Utc>, repeat: RepeatRule) -> NewReminder {
    NewReminder {
        title: "Water the plants".to_owned(),
        date: at,
        time: ReminderTime::new(at.time()),
        repeat,
        user_id: 1,
    }
}
