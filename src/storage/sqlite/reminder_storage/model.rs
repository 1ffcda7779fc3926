use anyhow::Context;
use chrono::{DateTime, Utc};

use crate::models::Reminder;

#[derive(sqlx::FromRow)]
pub struct ReminderStorageModel {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub date: DateTime<Utc>,
    pub time_of_day: String,
    pub repeat_rule: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Reminder> for ReminderStorageModel {
    fn from(value: Reminder) -> Self {
        Self {
            id: value.id,
            user_id: value.user_id,
            title: value.title,
            date: value.date,
            time_of_day: value.time.to_string(),
            repeat_rule: value.repeat.to_string(),
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

impl TryFrom<ReminderStorageModel> for Reminder {
    type Error = anyhow::Error;

    fn try_from(value: ReminderStorageModel) -> Result<Self, Self::Error> {
        let id = value.id;
        Ok(Self {
            id,
            user_id: value.user_id,
            title: value.title,
            date: value.date,
            time: value
                .time_of_day
                .parse()
                .with_context(|| format!("Invalid time_of_day for reminder {id}"))?,
            repeat: value
                .repeat_rule
                .parse()
                .with_context(|| format!("Invalid repeat_rule for reminder {id}"))?,
            created_at: value.created_at,
            updated_at: value.updated_at,
        })
    }
}
