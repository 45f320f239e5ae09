//! Wall-clock scheduling in the reference timezone.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Waits between attempts at a window whose run aborted.
const RETRY_DELAYS_SECS: [u64; 4] = [60, 5 * 60, 15 * 60, 60 * 60];

/// Delay before retry number `attempt` (1-based), or `None` once retries are spent.
pub fn retry_delay(attempt: usize) -> Option<std::time::Duration> {
    attempt
        .checked_sub(1)
        .and_then(|i| RETRY_DELAYS_SECS.get(i))
        .map(|secs| std::time::Duration::from_secs(*secs))
}

/// `at` on `date` in `tz`. A time inside a DST gap moves forward an hour.
fn local_instant(date: NaiveDate, at: NaiveTime, tz: Tz) -> Option<DateTime<Utc>> {
    let naive = date.and_time(at);
    tz.from_local_datetime(&naive)
        .earliest()
        .or_else(|| tz.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .map(|dt| dt.with_timezone(&Utc))
}

/// The first instant strictly after `now` whose local time in `tz` is `at`.
pub fn next_run_after(now: DateTime<Utc>, tz: Tz, at: NaiveTime) -> DateTime<Utc> {
    let today = now.with_timezone(&tz).date_naive();
    today
        .iter_days()
        .take(3)
        .filter_map(|date| local_instant(date, at, tz))
        .find(|candidate| *candidate > now)
        .unwrap_or(now + Duration::days(1))
}
