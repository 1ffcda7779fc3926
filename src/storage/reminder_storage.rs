use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use tokio::sync::RwLock;

use crate::models::{NewReminder, Reminder, ReminderId, UserId};

/// Persisted reminders. Range queries are defined on the effective fire instant,
/// evaluated in the timezone the store was created with.
#[async_trait]
pub trait ReminderStorage: Send + Sync {
    async fn get(&self, id: ReminderId) -> anyhow::Result<Option<Reminder>>;
    async fn list_for_user(&self, user_id: UserId) -> anyhow::Result<Vec<Reminder>>;
    async fn insert(&self, reminder: NewReminder) -> anyhow::Result<Reminder>;
    async fn update(&self, reminder: Reminder) -> anyhow::Result<Reminder>;

    /// Removes the record atomically. `true` only for the single caller that actually
    /// removed it; concurrent callers for the same id observe `false`.
    async fn delete_if_present(&self, id: ReminderId) -> anyhow::Result<bool>;

    /// Reminders whose fire instant lies in `[start, end]`.
    async fn find_due_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Reminder>>;

    /// Reminders whose fire instant is at or after `now`.
    async fn find_all_future_from(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<Reminder>>;
}

struct InMemoryReminderStore {
    next_id: ReminderId,
    reminders: HashMap<ReminderId, Reminder>,
}

pub struct InMemoryReminderStorage {
    store: RwLock<InMemoryReminderStore>,
    tz: Tz,
}

impl InMemoryReminderStorage {
    pub fn new(tz: Tz) -> Self {
        InMemoryReminderStorage {
            store: RwLock::new(InMemoryReminderStore {
                next_id: 1,
                reminders: HashMap::new(),
            }),
            tz,
        }
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.reminders.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn get_all(&self) -> Vec<Reminder> {
        let store = self.store.read().await;
        let mut reminders: Vec<_> = store.reminders.values().cloned().collect();
        reminders.sort_by_key(|r| r.id);
        reminders
    }

    async fn find_by_fire_instant(&self, matches: impl Fn(DateTime<Utc>) -> bool) -> Vec<Reminder> {
        let store = self.store.read().await;
        let mut found: Vec<_> = store
            .reminders
            .values()
            .filter(|r| matches(r.fire_instant(self.tz)))
            .cloned()
            .collect();
        found.sort_by_key(|r| (r.fire_instant(self.tz), r.id));
        found
    }
}

#[async_trait]
impl ReminderStorage for InMemoryReminderStorage {
    async fn get(&self, id: ReminderId) -> anyhow::Result<Option<Reminder>> {
        let store = self.store.read().await;
        Ok(store.reminders.get(&id).cloned())
    }

    async fn list_for_user(&self, user_id: UserId) -> anyhow::Result<Vec<Reminder>> {
        let store = self.store.read().await;
        let mut reminders: Vec<_> = store
            .reminders
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        reminders.sort_by_key(|r| (r.date, r.id));
        Ok(reminders)
    }

    async fn insert(&self, reminder: NewReminder) -> anyhow::Result<Reminder> {
        let mut store = self.store.write().await;
        let id = store.next_id;
        let now = Utc::now();
        let created = Reminder {
            id,
            title: reminder.title,
            date: reminder.date,
            time: reminder.time,
            repeat: reminder.repeat,
            user_id: reminder.user_id,
            created_at: now,
            updated_at: now,
        };

        store.reminders.insert(id, created.clone());
        store.next_id += 1;
        log::debug!("Inserted reminder [reminder_id = {}]", id);

        Ok(created)
    }

    async fn update(&self, mut reminder: Reminder) -> anyhow::Result<Reminder> {
        let mut store = self.store.write().await;
        let id = reminder.id;
        if let Some(existing) = store.reminders.get_mut(&id) {
            reminder.created_at = existing.created_at;
            reminder.updated_at = Utc::now();
            *existing = reminder.clone();
            Ok(reminder)
        } else {
            anyhow::bail!("Reminder {} does not exist", id);
        }
    }

    async fn delete_if_present(&self, id: ReminderId) -> anyhow::Result<bool> {
        let mut store = self.store.write().await;
        Ok(store.reminders.remove(&id).is_some())
    }

    async fn find_due_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Reminder>> {
        Ok(self
            .find_by_fire_instant(|fire_at| start <= fire_at && fire_at <= end)
            .await)
    }

    async fn find_all_future_from(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<Reminder>> {
        Ok(self.find_by_fire_instant(|fire_at| fire_at >= now).await)
    }
}
