//! Cycle clock: when does a task next become claimable?
//!
//! Every function here is pure. `FIXED_DAILY` and `WINDOW` are anchored to
//! wall-clock local midnight rather than to when a task was created, so all
//! tasks sharing a policy land back on the same grid after a missed claim.
//!
//! The `*_in` variants take any [`chrono::TimeZone`]; the plain variants use
//! the process's local time zone.

pub mod readiness;

use chrono::{Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::types::{RecurrencePolicy, Task};

pub const MS_PER_MINUTE: i64 = 60_000;
pub const MS_PER_HOUR: i64 = 3_600_000;

/// Smallest `WINDOW` block; a zero duration would never advance.
pub const MIN_WINDOW_MS: i64 = MS_PER_MINUTE;

/// Duration used when a task carries neither hours nor minutes.
pub const DEFAULT_DURATION_HOURS: u32 = 24;

/// Duration in milliseconds from optional hour/minute parameters.
///
/// Missing both means 24h; a missing half counts as zero.
pub fn duration_ms(hours: Option<u32>, minutes: Option<u32>) -> i64 {
    match (hours, minutes) {
        (None, None) => i64::from(DEFAULT_DURATION_HOURS) * MS_PER_HOUR,
        (h, m) => {
            i64::from(h.unwrap_or(0)) * MS_PER_HOUR + i64::from(m.unwrap_or(0)) * MS_PER_MINUTE
        }
    }
}

/// Next due time in the local time zone.
pub fn compute_next_due_at(
    policy: RecurrencePolicy,
    hours: Option<u32>,
    minutes: Option<u32>,
    from: i64,
) -> i64 {
    compute_next_due_at_in(&chrono::Local, policy, hours, minutes, from)
}

/// Next due time for `policy`, measured from `from` in time zone `tz`.
pub fn compute_next_due_at_in<Tz: TimeZone>(
    tz: &Tz,
    policy: RecurrencePolicy,
    hours: Option<u32>,
    minutes: Option<u32>,
    from: i64,
) -> i64 {
    match policy {
        RecurrencePolicy::Sliding => from.saturating_add(duration_ms(hours, minutes)),
        RecurrencePolicy::FixedDaily => next_local_midnight_in(tz, from),
        RecurrencePolicy::Window => {
            let block = duration_ms(hours, minutes).max(MIN_WINDOW_MS);
            let midnight = local_midnight_in(tz, from);
            let elapsed = (from - midnight).max(0);
            midnight + (elapsed / block + 1) * block
        }
    }
}

/// Next due time for an existing task, using its own policy and duration.
pub fn next_due_for(task: &Task, from: i64) -> i64 {
    compute_next_due_at(task.policy, task.custom_hours, task.custom_minutes, from)
}

/// Start of the local day containing `at`.
pub fn local_midnight_in<Tz: TimeZone>(tz: &Tz, at: i64) -> i64 {
    day_start(tz, local_date(tz, at))
}

/// Start of the local day after the one containing `at`.
pub fn next_local_midnight_in<Tz: TimeZone>(tz: &Tz, at: i64) -> i64 {
    let date = local_date(tz, at);
    let next = date.succ_opt().unwrap_or(date);
    day_start(tz, next)
}

fn local_date<Tz: TimeZone>(tz: &Tz, at: i64) -> NaiveDate {
    match tz.timestamp_millis_opt(at).earliest() {
        Some(dt) => dt.date_naive(),
        None => Utc
            .timestamp_millis_opt(at)
            .earliest()
            .map(|dt| dt.date_naive())
            .unwrap_or_default(),
    }
}

/// First instant of `date` in `tz`.
///
/// A DST transition can skip midnight entirely; the first valid local
/// minute after the gap is used then.
fn day_start<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> i64 {
    let midnight = date.and_time(NaiveTime::MIN);
    match tz.from_local_datetime(&midnight) {
        LocalResult::Single(dt) => dt.timestamp_millis(),
        LocalResult::Ambiguous(earliest, _) => earliest.timestamp_millis(),
        LocalResult::None => (1..=180)
            .find_map(|m| {
                tz.from_local_datetime(&(midnight + Duration::minutes(m)))
                    .earliest()
            })
            .map(|dt| dt.timestamp_millis())
            .unwrap_or_else(|| midnight.and_utc().timestamp_millis()),
    }
}
