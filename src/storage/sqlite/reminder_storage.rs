mod model;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use chrono_tz::Tz;
use model::ReminderStorageModel;

use crate::{
    models::{NewReminder, Reminder, ReminderId, UserId},
    storage::ReminderStorage,
};

/// Widening applied to `date` pre-filters; a fire instant is never further than
/// one local day plus one UTC offset away from the stored `date`.
const DATE_MARGIN: TimeDelta = TimeDelta::days(2);

pub struct SqliteReminderStorage {
    pool: sqlx::SqlitePool,
    tz: Tz,
}

impl SqliteReminderStorage {
    pub fn new(pool: sqlx::SqlitePool, tz: Tz) -> Self {
        Self { pool, tz }
    }

    fn sorted_by_fire_instant(&self, mut reminders: Vec<Reminder>) -> Vec<Reminder> {
        reminders.sort_by_key(|r| (r.fire_instant(self.tz), r.id));
        reminders
    }
}

fn parse_rows(rows: Vec<ReminderStorageModel>) -> anyhow::Result<Vec<Reminder>> {
    rows.into_iter().map(Reminder::try_from).collect()
}

#[async_trait]
impl ReminderStorage for SqliteReminderStorage {
    async fn get(&self, id: ReminderId) -> anyhow::Result<Option<Reminder>> {
        let reminder = sqlx::query_as::<_, ReminderStorageModel>(
            "SELECT * FROM reminders WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        reminder.map(Reminder::try_from).transpose()
    }

    async fn list_for_user(&self, user_id: UserId) -> anyhow::Result<Vec<Reminder>> {
        let reminders = sqlx::query_as::<_, ReminderStorageModel>(
            "SELECT * FROM reminders WHERE user_id = ? ORDER BY date, id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        parse_rows(reminders)
    }

    async fn insert(&self, reminder: NewReminder) -> anyhow::Result<Reminder> {
        let NewReminder {
            title,
            date,
            time,
            repeat,
            user_id,
        } = reminder;
        let now = Utc::now();

        let created_reminder = sqlx::query_as::<_, ReminderStorageModel>(
            "INSERT INTO reminders
(user_id, title, date, time_of_day, repeat_rule, created_at, updated_at)
VALUES (?, ?, ?, ?, ?, ?, ?) RETURNING *",
        )
        .bind(user_id)
        .bind(title)
        .bind(date)
        .bind(time.to_string())
        .bind(repeat.to_string())
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        created_reminder.try_into()
    }

    async fn update(&self, reminder: Reminder) -> anyhow::Result<Reminder> {
        let ReminderStorageModel {
            id,
            user_id: _,
            title,
            date,
            time_of_day,
            repeat_rule,
            created_at: _,
            updated_at: _,
        } = reminder.into();

        let updated_reminder = sqlx::query_as::<_, ReminderStorageModel>(
            "
UPDATE reminders
SET title = ?,
    date = ?,
    time_of_day = ?,
    repeat_rule = ?,
    updated_at = ?
WHERE id = ?
RETURNING *
",
        )
        .bind(title)
        .bind(date)
        .bind(time_of_day)
        .bind(repeat_rule)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match updated_reminder {
            Some(row) => row.try_into(),
            None => anyhow::bail!("Reminder {} does not exist", id),
        }
    }

    async fn delete_if_present(&self, id: ReminderId) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM reminders WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_due_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> anyhow::Result<Vec<Reminder>> {
        let candidates = sqlx::query_as::<_, ReminderStorageModel>(
            "SELECT * FROM reminders WHERE date >= ? AND date <= ?",
        )
        .bind(start - DATE_MARGIN)
        .bind(end + DATE_MARGIN)
        .fetch_all(&self.pool)
        .await?;

        let due = parse_rows(candidates)?
            .into_iter()
            .filter(|r| {
                let fire_at = r.fire_instant(self.tz);
                start <= fire_at && fire_at <= end
            })
            .collect();

        Ok(self.sorted_by_fire_instant(due))
    }

    async fn find_all_future_from(&self, now: DateTime<Utc>) -> anyhow::Result<Vec<Reminder>> {
        let candidates = sqlx::query_as::<_, ReminderStorageModel>(
            "SELECT * FROM reminders WHERE date >= ?",
        )
        .bind(now - DATE_MARGIN)
        .fetch_all(&self.pool)
        .await?;

        let future = parse_rows(candidates)?
            .into_iter()
            .filter(|r| r.fire_instant(self.tz) >= now)
            .collect();

        Ok(self.sorted_by_fire_instant(future))
    }
}
