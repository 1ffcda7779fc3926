use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::{
    models::{NewReminder, Reminder, ReminderId, ReminderTime, RepeatRule, UserId, ValidationError},
    scheduling::SchedulerService,
    storage::ReminderStorage,
};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Reminder {0} not found")]
    NotFound(ReminderId),

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

/// Input for a new reminder. Missing time and repeat fall back to `08:00` and `Never`.
#[derive(Debug, Clone, Default)]
pub struct CreateReminder {
    pub title: String,
    pub date: Option<DateTime<Utc>>,
    pub time: Option<String>,
    pub repeat: Option<String>,
}

/// Partial update, `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateReminder {
    pub title: Option<String>,
    pub date: Option<DateTime<Utc>>,
    pub time: Option<String>,
    pub repeat: Option<String>,
}

impl CreateReminder {
    fn validate(self, user_id: UserId) -> Result<NewReminder, ValidationError> {
        let title = validate_title(&self.title)?;
        let date = self.date.ok_or(ValidationError::MissingDate)?;
        let time = self
            .time
            .as_deref()
            .map(str::parse::<ReminderTime>)
            .transpose()?
            .unwrap_or_default();
        let repeat = self
            .repeat
            .as_deref()
            .map(str::parse::<RepeatRule>)
            .transpose()?
            .unwrap_or_default();

        Ok(NewReminder {
            title,
            date,
            time,
            repeat,
            user_id,
        })
    }
}

impl UpdateReminder {
    fn apply_to(self, mut reminder: Reminder) -> Result<Reminder, ValidationError> {
        if let Some(title) = self.title {
            reminder.title = validate_title(&title)?;
        }
        if let Some(date) = self.date {
            reminder.date = date;
        }
        if let Some(time) = self.time {
            reminder.time = time.parse()?;
        }
        if let Some(repeat) = self.repeat {
            reminder.repeat = repeat.parse()?;
        }
        Ok(reminder)
    }
}

fn validate_title(title: &str) -> Result<String, ValidationError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(ValidationError::EmptyTitle);
    }
    Ok(title.to_owned())
}

/// Reminder CRUD for a single user, keeping the scheduler's timers in step with storage.
pub struct ReminderCommands {
    storage: Arc<dyn ReminderStorage>,
    scheduler: SchedulerService,
}

impl ReminderCommands {
    pub fn new(storage: Arc<dyn ReminderStorage>, scheduler: SchedulerService) -> Self {
        Self { storage, scheduler }
    }

    pub async fn create(
        &self,
        user_id: UserId,
        input: CreateReminder,
    ) -> Result<Reminder, CommandError> {
        let new_reminder = input.validate(user_id)?;
        let reminder = self.storage.insert(new_reminder).await?;
        log::info!(
            "Reminder created [reminder_id = {}, user_id = {}]",
            reminder.id,
            user_id
        );

        self.scheduler.schedule_reminder(reminder.clone());
        Ok(reminder)
    }

    pub async fn update(
        &self,
        user_id: UserId,
        id: ReminderId,
        patch: UpdateReminder,
    ) -> Result<Reminder, CommandError> {
        let existing = self.get(user_id, id).await?;
        let reminder = self.storage.update(patch.apply_to(existing)?).await?;
        log::info!("Reminder updated [reminder_id = {}]", id);

        self.scheduler.update_reminder(reminder.clone());
        Ok(reminder)
    }

    pub async fn delete(&self, user_id: UserId, id: ReminderId) -> Result<(), CommandError> {
        self.get(user_id, id).await?;
        if !self.storage.delete_if_present(id).await? {
            return Err(CommandError::NotFound(id));
        }
        log::info!("Reminder deleted [reminder_id = {}]", id);

        self.scheduler.cancel_reminder(id);
        Ok(())
    }

    /// Reminders owned by someone else are reported as missing.
    pub async fn get(&self, user_id: UserId, id: ReminderId) -> Result<Reminder, CommandError> {
        self.storage
            .get(id)
            .await?
            .filter(|reminder| reminder.user_id == user_id)
            .ok_or(CommandError::NotFound(id))
    }

    pub async fn list(&self, user_id: UserId) -> Result<Vec<Reminder>, CommandError> {
        Ok(self.storage.list_for_user(user_id).await?)
    }
}
