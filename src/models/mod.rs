pub mod reminder;
pub mod user;

pub use reminder::{NewReminder, RepeatRule, Reminder, ReminderId, ReminderTime, ValidationError};
pub use user::{NewUser, User, UserId};
