mod mail;
mod smtp;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{Reminder, UserId};

pub use mail::{LogMailTransport, MailNotificationSender, MailTransport, ReminderEmail};
pub use smtp::SmtpMailTransport;

#[derive(Debug, Error)]
pub enum NotificationError {
    #[error("User {0} does not exist")]
    UnknownUser(UserId),

    #[error("User {0} does not have an email address")]
    NoEmailConfigured(UserId),

    #[error("Could not load user: {0}")]
    Storage(#[source] anyhow::Error),

    #[error(transparent)]
    Transport(anyhow::Error),
}

/// Delivers one notification for one occurrence of a reminder.
#[async_trait]
pub trait NotificationSender: Send + Sync + 'static {
    async fn send(&self, user_id: UserId, reminder: &Reminder) -> Result<(), NotificationError>;
}
