use chrono::{
    offset::LocalResult, DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat,
    TimeZone, Timelike, Utc,
};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;
use tracing::warn;

use crate::error::{AppError, AppResult};
use crate::models::task::TaskPriority;

pub fn parse_datetime(value: &str) -> AppResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| {
            AppError::validation_with_details(
                "invalid timestamp",
                json!({"value": value, "error": err.to_string()}),
            )
        })
}

/// Fixed-width UTC form so stored timestamps compare lexically.
pub fn format_datetime(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn parse_timezone(name: &str) -> Option<Tz> {
    name.trim().parse::<Tz>().ok()
}

/// Resolve a caller-supplied IANA zone. Unknown names fall back to UTC.
pub fn resolve_timezone(name: &str) -> Tz {
    match parse_timezone(name) {
        Some(tz) => tz,
        None => {
            warn!(target: "app::suggest", time_zone = %name, "unknown time zone, falling back to UTC");
            Tz::UTC
        }
    }
}

/// Build a zoned instant from a local wall-clock time. Ambiguous times take
/// the earlier instant; times skipped by a DST jump move forward an hour.
pub fn local_datetime(tz: &Tz, date: NaiveDate, time: NaiveTime) -> DateTime<Tz> {
    let naive = date.and_time(time);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt,
        LocalResult::Ambiguous(first, _) => first,
        LocalResult::None => shift_out_of_gap(tz, naive),
    }
}

fn shift_out_of_gap(tz: &Tz, naive: NaiveDateTime) -> DateTime<Tz> {
    let shifted = naive + Duration::hours(1);
    tz.from_local_datetime(&shifted)
        .earliest()
        .unwrap_or_else(|| tz.from_utc_datetime(&naive))
}

pub fn local_minute_of_day(tz: &Tz, date: NaiveDate, minute_of_day: u32) -> DateTime<Utc> {
    let clamped = minute_of_day.min(24 * 60 - 1);
    let time = NaiveTime::from_hms_opt(clamped / 60, clamped % 60, 0).unwrap_or_default();
    local_datetime(tz, date, time).with_timezone(&Utc)
}

pub fn local_date(now: DateTime<Utc>, tz: &Tz) -> NaiveDate {
    now.with_timezone(tz).date_naive()
}

/// Start and end of the local day containing `now`, as UTC instants.
pub fn local_day_bounds(now: DateTime<Utc>, tz: &Tz) -> (DateTime<Utc>, DateTime<Utc>) {
    let date = local_date(now, tz);
    let start = local_datetime(tz, date, NaiveTime::default()).with_timezone(&Utc);
    let end = match date.succ_opt() {
        Some(next) => local_datetime(tz, next, NaiveTime::default()).with_timezone(&Utc),
        None => start + Duration::days(1),
    };
    (start, end)
}

pub fn truncate_to_minute(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_second(0)
        .and_then(|value| value.with_nanosecond(0))
        .unwrap_or(dt)
}

/// Half-open overlap test.
pub fn overlaps(
    a_start: DateTime<Utc>,
    a_end: DateTime<Utc>,
    b_start: DateTime<Utc>,
    b_end: DateTime<Utc>,
) -> bool {
    a_start < b_end && b_start < a_end
}

static SHORT_ACTIVITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(walk|call|email)").expect("valid regex"));
static MICRO_ACTIVITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(meditat|journal)").expect("valid regex"));
static FOCUS_ACTIVITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(brainstorm|read|design)").expect("valid regex"));

/// Heuristic duration for a task with no explicit length.
pub fn infer_duration_minutes(title: &str, priority: TaskPriority) -> i64 {
    let table: [(&Lazy<Regex>, i64); 3] = [
        (&SHORT_ACTIVITY, 30),
        (&MICRO_ACTIVITY, 15),
        (&FOCUS_ACTIVITY, 45),
    ];

    for (pattern, minutes) in table {
        if pattern.is_match(title) {
            return minutes;
        }
    }

    match priority {
        TaskPriority::High => 60,
        TaskPriority::Medium => 45,
        TaskPriority::Low => 30,
    }
}
