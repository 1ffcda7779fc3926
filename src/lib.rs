pub mod appsettings;
pub mod clock;
pub mod models;
pub mod notification;
pub mod recurrence;
pub mod reminders;
pub mod scheduling;
pub mod storage;

#[cfg(test)]
mod test_utils;
