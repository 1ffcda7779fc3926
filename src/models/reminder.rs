use std::{fmt, str::FromStr};

use chrono::{
    DateTime, LocalResult, NaiveDateTime, NaiveTime, Offset, TimeDelta, TimeZone, Timelike, Utc,
};
use chrono_tz::Tz;
use thiserror::Error;

use super::user::UserId;

pub type ReminderId = i64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Title must not be empty")]
    EmptyTitle,

    #[error("Date is required")]
    MissingDate,

    #[error("Time format should be HH:MM, got {0:?}")]
    InvalidTime(String),

    #[error("Unknown repeat rule {0:?}")]
    InvalidRepeat(String),
}

/// Time of day a reminder fires at, `HH:MM` with minute precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReminderTime(NaiveTime);

impl ReminderTime {
    pub fn new(inner: NaiveTime) -> Self {
        let normalized_time = inner
            .with_second(0)
            .and_then(|t| t.with_nanosecond(0))
            .expect("Zero seconds are always valid.");
        Self(normalized_time)
    }

    pub fn from_hm(hours: u32, minutes: u32) -> Option<Self> {
        NaiveTime::from_hms_opt(hours, minutes, 0).map(Self)
    }

    pub fn time(&self) -> &NaiveTime {
        &self.0
    }
}

impl Default for ReminderTime {
    fn default() -> Self {
        Self(NaiveTime::from_hms_opt(8, 0, 0).expect("08:00 is a valid time."))
    }
}

impl FromStr for ReminderTime {
    type Err = ValidationError;

    // Hours accept an optional leading zero (`7:05`), minutes are always two digits.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidTime(s.to_owned());
        let (hours, minutes) = s.split_once(':').ok_or_else(invalid)?;

        let all_digits = |part: &str| !part.is_empty() && part.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(hours) || hours.len() > 2 || !all_digits(minutes) || minutes.len() != 2 {
            return Err(invalid());
        }

        let hours: u32 = hours.parse().map_err(|_| invalid())?;
        let minutes: u32 = minutes.parse().map_err(|_| invalid())?;
        if hours > 23 || minutes > 59 {
            return Err(invalid());
        }

        Self::from_hm(hours, minutes).ok_or_else(invalid)
    }
}

impl fmt::Display for ReminderTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0.hour(), self.0.minute())
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RepeatRule {
    #[default]
    Never,
    EveryDay,
    EveryWeek,
    EveryMonth,
}

impl RepeatRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepeatRule::Never => "Never",
            RepeatRule::EveryDay => "Every day",
            RepeatRule::EveryWeek => "Every week",
            RepeatRule::EveryMonth => "Every month",
        }
    }
}

impl FromStr for RepeatRule {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Never" => Ok(RepeatRule::Never),
            "Every day" => Ok(RepeatRule::EveryDay),
            "Every week" => Ok(RepeatRule::EveryWeek),
            "Every month" => Ok(RepeatRule::EveryMonth),
            other => Err(ValidationError::InvalidRepeat(other.to_owned())),
        }
    }
}

impl fmt::Display for RepeatRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reminder {
    pub id: ReminderId,
    pub title: String,
    /// Only the calendar day (in the scheduler's timezone) is significant for firing.
    pub date: DateTime<Utc>,
    pub time: ReminderTime,
    pub repeat: RepeatRule,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reminder {
    /// The absolute moment this occurrence is due: the day of `date` combined with `time`,
    /// both read in `tz`. Always derived from the two fields, never stored.
    pub fn fire_instant(&self, tz: Tz) -> DateTime<Utc> {
        fire_instant(self.date, self.time, tz)
    }
}

/// A reminder that has not been persisted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewReminder {
    pub title: String,
    pub date: DateTime<Utc>,
    pub time: ReminderTime,
    pub repeat: RepeatRule,
    pub user_id: UserId,
}

impl NewReminder {
    /// The occurrence that follows `reminder`, or `None` when it does not repeat.
    pub fn next_occurrence_of(reminder: &Reminder, tz: Tz) -> Option<Self> {
        let date = crate::recurrence::next_occurrence(reminder.date, reminder.repeat, tz)?;

        Some(Self {
            title: reminder.title.clone(),
            date,
            time: reminder.time,
            repeat: reminder.repeat,
            user_id: reminder.user_id,
        })
    }

    /// The first occurrence after `reminder` that fires strictly after `now`, together
    /// with the number of occurrences stepped over to get there.
    pub fn next_occurrence_after(
        reminder: &Reminder,
        now: DateTime<Utc>,
        tz: Tz,
    ) -> Option<(Self, usize)> {
        let mut next = Self::next_occurrence_of(reminder, tz)?;
        let mut skipped = 0;
        while next.fire_instant(tz) <= now {
            next.date = crate::recurrence::next_occurrence(next.date, next.repeat, tz)?;
            skipped += 1;
        }
        Some((next, skipped))
    }

    pub fn fire_instant(&self, tz: Tz) -> DateTime<Utc> {
        fire_instant(self.date, self.time, tz)
    }
}

fn fire_instant(date: DateTime<Utc>, time: ReminderTime, tz: Tz) -> DateTime<Utc> {
    let day = date.with_timezone(&tz).date_naive();
    resolve_local(tz, day.and_time(*time.time()))
}

/// Resolves a wall-clock time in `tz` to an instant. Ambiguous times take the earliest
/// candidate; times inside a DST gap move forward by the length of the gap.
pub fn resolve_local(tz: Tz, local: NaiveDateTime) -> DateTime<Utc> {
    match tz.from_local_datetime(&local) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(first, second) => first.min(second).with_timezone(&Utc),
        LocalResult::None => {
            // a transition never happens twice a day, so a day earlier is before the gap
            let offset_before = tz
                .offset_from_utc_datetime(&(local - TimeDelta::days(1)))
                .fix()
                .local_minus_utc();
            (local - TimeDelta::seconds(i64::from(offset_before))).and_utc()
        }
    }
}
