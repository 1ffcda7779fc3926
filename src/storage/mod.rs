mod reminder_storage;
pub mod sqlite;
mod user_storage;

pub use reminder_storage::{InMemoryReminderStorage, ReminderStorage};
pub use user_storage::{InMemoryUserStorage, UserStorage};
