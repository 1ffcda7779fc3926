//! Next-occurrence arithmetic for repeating reminders.
//!
//! Monthly repeats clamp to the last day of a shorter month: Jan 31 is followed by
//! Feb 28 (Feb 29 in leap years). The clamped day is kept from then on, so the chain
//! continues Mar 28, Apr 28 and so on.

use chrono::{DateTime, Days, Months, NaiveDate, Utc};
use chrono_tz::Tz;

use crate::models::{RepeatRule, reminder::resolve_local};

pub fn next_occurrence_date(current: NaiveDate, repeat: RepeatRule) -> Option<NaiveDate> {
    match repeat {
        RepeatRule::Never => None,
        RepeatRule::EveryDay => current.checked_add_days(Days::new(1)),
        RepeatRule::EveryWeek => current.checked_add_days(Days::new(7)),
        RepeatRule::EveryMonth => current.checked_add_months(Months::new(1)),
    }
}

/// Advances the calendar day of `current` (as seen in `tz`) by one step of `repeat`,
/// leaving the wall-clock time of day untouched.
pub fn next_occurrence(
    current: DateTime<Utc>,
    repeat: RepeatRule,
    tz: Tz,
) -> Option<DateTime<Utc>> {
    let local = current.with_timezone(&tz).naive_local();
    let next_day = next_occurrence_date(local.date(), repeat)?;

    Some(resolve_local(tz, next_day.and_time(local.time())))
}
