use chrono::{
    DateTime, Datelike, Duration, FixedOffset, Months, NaiveDate, NaiveTime, Offset, Timelike,
};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tracing::debug;

use crate::models::task::{
    RecurrenceKind, TaskCategory, TaskDescriptor, TaskPriority, TaskRecurrence,
};
use crate::services::schedule_utils::local_datetime;

pub const UNTITLED_TASK: &str = "Untitled Task";

const MONTHS: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

const WEEKDAYS: [&str; 7] = [
    "sunday",
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
];

/// Words that make an `at|in <phrase>` match a time of day rather than a place.
const TIME_PHRASE_WORDS: &[&str] = &[
    "the", "a", "an", "this", "next", "few", "couple", "of", "morning", "afternoon", "evening",
    "night", "noon", "midnight", "tonight", "today", "tomorrow", "day", "days", "week", "weeks",
    "weekend", "month", "months", "year", "years", "hour", "hours", "minute", "minutes",
    "sunday", "monday", "tuesday", "wednesday", "thursday", "friday", "saturday",
];

/// Connectors left dangling at the end of a title once phrases are stripped.
const DANGLING_WORDS: &[&str] = &["by", "on", "at", "in", "for", "with", "and", "from", "to"];

const PHRASE_STOP: &str = r"(?P<stop>\s+(?:on|for|with|at|in|by|from|about|to|tomorrow|today|tonight|next|this|every|daily|weekly|monthly|yearly)\b|\s+\d|\s*[#,.;!?]|$)";
const NAMES_STOP: &str = r"(?P<stop>\s+(?:on|for|at|in|by|from|about|to|tomorrow|today|tonight|next|this|every|daily|weekly|monthly|yearly)\b|\s+\d|\s*[#.;!?]|\s*,?\s*$)";

fn keyword_regex(words: &[&str]) -> Regex {
    let alternatives = words
        .iter()
        .map(|word| regex::escape(word).replace(' ', r"\s+"))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{alternatives})\b")).expect("valid keyword regex")
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("valid parser regex")
}

// Buckets are evaluated in order; the first bucket with a hit wins.
static PRIORITY_BUCKETS: Lazy<Vec<(TaskPriority, Regex)>> = Lazy::new(|| {
    vec![
        (
            TaskPriority::High,
            keyword_regex(&[
                "urgent",
                "asap",
                "important",
                "critical",
                "emergency",
                "now",
                "today",
                "immediately",
                "priority",
                "rush",
                "deadline",
            ]),
        ),
        (
            TaskPriority::Medium,
            keyword_regex(&["soon", "this week", "moderate", "normal", "standard"]),
        ),
        (
            TaskPriority::Low,
            keyword_regex(&["sometime", "when possible", "eventually", "no rush", "flexible"]),
        ),
    ]
});

static NO_RUSH: Lazy<Regex> = Lazy::new(|| compile(r"(?i)\bno\s+rush\b"));

static CATEGORY_BUCKETS: Lazy<Vec<(TaskCategory, Regex)>> = Lazy::new(|| {
    vec![
        (
            TaskCategory::Personal,
            keyword_regex(&[
                "call", "mom", "dad", "family", "home", "grocery", "groceries", "shopping",
                "laundry", "clean", "errand", "errands", "birthday", "personal",
            ]),
        ),
        (
            TaskCategory::Work,
            keyword_regex(&[
                "meeting", "call", "email", "report", "project", "deadline", "client",
                "presentation", "office", "work", "boss", "review",
            ]),
        ),
        (
            TaskCategory::Health,
            keyword_regex(&[
                "gym", "workout", "exercise", "run", "doctor", "dentist", "yoga", "meditate",
                "meditation", "walk", "health",
            ]),
        ),
        (
            TaskCategory::Social,
            keyword_regex(&[
                "party", "dinner", "lunch", "friend", "friends", "drinks", "hangout", "date",
                "social",
            ]),
        ),
        (
            TaskCategory::Creative,
            keyword_regex(&[
                "write", "paint", "draw", "design", "music", "guitar", "creative", "photo",
            ]),
        ),
        (
            TaskCategory::Learning,
            keyword_regex(&[
                "study", "learn", "read", "course", "class", "homework", "lecture", "book",
            ]),
        ),
        (
            TaskCategory::Finance,
            keyword_regex(&[
                "pay", "bill", "bills", "budget", "tax", "taxes", "bank", "invoice", "rent",
            ]),
        ),
        (
            TaskCategory::Travel,
            keyword_regex(&[
                "flight", "trip", "travel", "hotel", "airport", "train", "pack", "vacation",
            ]),
        ),
    ]
});

static RECURRENCE_BUCKETS: Lazy<Vec<(RecurrenceKind, Regex)>> = Lazy::new(|| {
    vec![
        (
            RecurrenceKind::Daily,
            compile(r"(?i)\b(?:daily|every\s*day|each\s+day|every\s+(?:morning|night|evening))\b"),
        ),
        (
            RecurrenceKind::Weekly,
            compile(r"(?i)\b(?:weekly|every\s+week|each\s+week|every\s+(?:sunday|monday|tuesday|wednesday|thursday|friday|saturday))\b"),
        ),
        (
            RecurrenceKind::Monthly,
            compile(r"(?i)\b(?:monthly|every\s+month|each\s+month)\b"),
        ),
        (
            RecurrenceKind::Yearly,
            compile(r"(?i)\b(?:yearly|annually|every\s+year|each\s+year)\b"),
        ),
    ]
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RelativeDay {
    InHours,
    InDays,
    NextWeekend,
    ThisWeekend,
    NextWeek,
    NextYear,
    Tomorrow,
    Tonight,
    ThisMorning,
    ThisAfternoon,
    ThisEvening,
    Today,
}

static RELATIVE_RULES: Lazy<Vec<(RelativeDay, Regex)>> = Lazy::new(|| {
    vec![
        (RelativeDay::InHours, compile(r"(?i)\bin\s+(\d{1,4})\s+(?:hours?|hrs?)\b")),
        (RelativeDay::InDays, compile(r"(?i)\bin\s+(\d{1,4})\s+days?\b")),
        (RelativeDay::NextWeekend, compile(r"(?i)\bnext\s+weekend\b")),
        (RelativeDay::ThisWeekend, compile(r"(?i)\bthis\s+weekend\b")),
        (RelativeDay::NextWeek, compile(r"(?i)\bnext\s+week\b")),
        (RelativeDay::NextYear, compile(r"(?i)\bnext\s+year\b")),
        (RelativeDay::Tomorrow, compile(r"(?i)\btomorrow\b")),
        (RelativeDay::Tonight, compile(r"(?i)\btonight\b")),
        (RelativeDay::ThisMorning, compile(r"(?i)\bthis\s+morning\b")),
        (RelativeDay::ThisAfternoon, compile(r"(?i)\bthis\s+afternoon\b")),
        (RelativeDay::ThisEvening, compile(r"(?i)\bthis\s+evening\b")),
        (RelativeDay::Today, compile(r"(?i)\btoday\b")),
    ]
});

static PART_OF_DAY: Lazy<Regex> = Lazy::new(|| {
    compile(r"(?i)\b(?:in\s+the\s+|this\s+)?(tonight|morning|afternoon|evening)\b")
});
static WEEKDAY: Lazy<Regex> = Lazy::new(|| {
    compile(r"(?i)\b(?:(?:on|next|this)\s+)?(sunday|monday|tuesday|wednesday|thursday|friday|saturday)s?\b")
});

static AT_CLOCK: Lazy<Regex> =
    Lazy::new(|| compile(r"(?i)\bat\s+(\d{1,2})(?::(\d{2}))?\s*(am|pm)?\b"));
static BARE_CLOCK: Lazy<Regex> =
    Lazy::new(|| compile(r"(?i)\b(\d{1,2})(?::(\d{2}))?\s*(am|pm)\b"));

static ON_MONTH_DAY: Lazy<Regex> = Lazy::new(|| {
    compile(r"(?i)\bon\s+([a-z]{3,9})\.?\s+(\d{1,2})(?:st|nd|rd|th)?(?:,?\s+(\d{4}))?\b")
});
static ON_DAY_OF_MONTH: Lazy<Regex> = Lazy::new(|| {
    compile(r"(?i)\bon\s+the\s+(\d{1,2})(?:st|nd|rd|th)?\s+of\s+([a-z]{3,9})(?:,?\s+(\d{4}))?\b")
});
static SLASH_DATE: Lazy<Regex> =
    Lazy::new(|| compile(r"\b(\d{1,2})/(\d{1,2})(?:/(\d{4}|\d{2}))?\b"));
static MONTH_DAY: Lazy<Regex> = Lazy::new(|| {
    compile(r"(?i)\b([a-z]{3,9})\.?\s+(\d{1,2})(?:st|nd|rd|th)?(?:,?\s+(\d{4}))?\b")
});

static COMBINED_DURATION: Lazy<Regex> = Lazy::new(|| {
    compile(r"(?i)(?:\bfor\s+)?\b(\d{1,3})\s*(?:hours?|hrs?)\s+(?:and\s+)?(\d{1,3})\s*(?:minutes?|mins?)\b(?:\s+long\b)?")
});
static HOUR_DURATION: Lazy<Regex> = Lazy::new(|| {
    compile(r"(?i)(?:\bfor\s+)?\b(\d{1,3}(?:\.\d+)?)\s*(?:hours?|hrs?)\b(?:\s+long\b)?")
});
static MINUTE_DURATION: Lazy<Regex> = Lazy::new(|| {
    compile(r"(?i)(?:\bfor\s+)?\b(\d{1,4})\s*(?:minutes?|mins?)\b(?:\s+long\b)?")
});

static LOCATION_LABEL: Lazy<Regex> =
    Lazy::new(|| compile(r"(?i)\blocation:\s*(?P<phrase>[^#,;\n]+)"));
static LOCATION: Lazy<Regex> = Lazy::new(|| {
    compile(&format!(
        r"(?i)\b(?:at|in)\s+(?P<phrase>[a-z][\w'&\- ]*?){PHRASE_STOP}"
    ))
});

static WITH_NAMES: Lazy<Regex> =
    Lazy::new(|| compile(&format!(r"(?i)\bwith\s+(?P<names>[a-z][\w'\-, ]*?){NAMES_STOP}")));
static CALL_NAMES: Lazy<Regex> =
    Lazy::new(|| compile(&format!(r"(?i)\bcall\s+(?P<names>[a-z][\w'\-, ]*?){NAMES_STOP}")));
static NAME_SEPARATOR: Lazy<Regex> = Lazy::new(|| compile(r"(?i)\s*,\s*|\s+and\s+"));

static HASHTAG: Lazy<Regex> = Lazy::new(|| compile(r"#([\w-]+)"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| compile(r"\s+"));

/// Turns one line of free text into a [`TaskDescriptor`].
///
/// Every field is extracted by an independent pass over the original text,
/// so one input can set priority, time, category, duration, recurrence,
/// location, attendees and tags at once. Parsing never fails; anything not
/// recognised keeps its default.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextIntentParser;

impl TextIntentParser {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(&self, text: &str, now: DateTime<Tz>) -> TaskDescriptor {
        let priority = detect_priority(text);
        let timestamp = resolve_timestamp(text, &now);

        let descriptor = TaskDescriptor {
            title: clean_title(text, priority),
            priority: priority.unwrap_or_default(),
            scheduled: timestamp.is_some(),
            timestamp,
            category: detect_category(text),
            duration: detect_duration(text),
            recurring: detect_recurrence(text),
            tags: extract_tags(text),
            location: detect_location(text),
            attendees: extract_attendees(text),
            original_text: text.to_string(),
        };

        debug!(
            target: "app::parser",
            priority = descriptor.priority.as_str(),
            scheduled = descriptor.scheduled,
            category = ?descriptor.category,
            duration = ?descriptor.duration,
            "parsed task text"
        );

        descriptor
    }
}

fn detect_priority(text: &str) -> Option<TaskPriority> {
    let without_no_rush = NO_RUSH.replace_all(text, " ");
    PRIORITY_BUCKETS
        .iter()
        .find(|(priority, pattern)| match priority {
            TaskPriority::High => pattern.is_match(&without_no_rush),
            _ => pattern.is_match(text),
        })
        .map(|(priority, _)| *priority)
}

fn detect_category(text: &str) -> Option<TaskCategory> {
    CATEGORY_BUCKETS
        .iter()
        .find(|(_, pattern)| pattern.is_match(text))
        .map(|(category, _)| *category)
}

fn detect_recurrence(text: &str) -> Option<TaskRecurrence> {
    RECURRENCE_BUCKETS
        .iter()
        .find(|(_, pattern)| pattern.is_match(text))
        .map(|(kind, _)| TaskRecurrence {
            kind: *kind,
            interval: 1,
        })
}

fn resolve_timestamp(text: &str, now: &DateTime<Tz>) -> Option<DateTime<FixedOffset>> {
    let clock = extract_clock(text);
    let resolved = resolve_relative(text, now)
        .or_else(|| resolve_weekday(text, now))
        .or_else(|| resolve_absolute(text, now));

    let (date, time) = match (resolved, clock) {
        (Some((date, _)), Some(clock)) => (date, clock),
        (Some((date, time)), None) => (date, part_of_day(text).unwrap_or(time)),
        (None, Some(clock)) => (now.date_naive(), clock),
        (None, None) => return None,
    };

    let zoned = local_datetime(&now.timezone(), date, time);
    Some(zoned.with_timezone(&zoned.offset().fix()))
}

fn extract_clock(text: &str) -> Option<NaiveTime> {
    [&AT_CLOCK, &BARE_CLOCK]
        .into_iter()
        .flat_map(|pattern| pattern.captures_iter(text))
        .find_map(|caps| clock_from_captures(&caps))
}

fn clock_from_captures(caps: &Captures) -> Option<NaiveTime> {
    let mut hour: u32 = caps.get(1)?.as_str().parse().ok()?;
    let minute: u32 = match caps.get(2) {
        Some(value) => value.as_str().parse().ok()?,
        None => 0,
    };

    if let Some(meridiem) = caps.get(3) {
        if !(1..=12).contains(&hour) {
            return None;
        }
        let is_pm = meridiem.as_str().eq_ignore_ascii_case("pm");
        if is_pm && hour != 12 {
            hour += 12;
        } else if !is_pm && hour == 12 {
            hour = 0;
        }
    }

    NaiveTime::from_hms_opt(hour, minute, 0)
}

fn now_time_of_day(now: &DateTime<Tz>) -> NaiveTime {
    NaiveTime::from_hms_opt(now.hour(), now.minute(), 0).unwrap_or_default()
}

fn days_until_saturday(now: &DateTime<Tz>) -> i64 {
    let current = i64::from(now.weekday().num_days_from_sunday());
    (6 - current + 7) % 7
}

fn resolve_relative(text: &str, now: &DateTime<Tz>) -> Option<(NaiveDate, NaiveTime)> {
    RELATIVE_RULES.iter().find_map(|(rule, pattern)| {
        let caps = pattern.captures(text)?;
        let today = now.date_naive();
        let time = now_time_of_day(now);
        let count = || caps.get(1).and_then(|value| value.as_str().parse::<i64>().ok());

        match rule {
            RelativeDay::InHours => {
                let target = now.naive_local() + Duration::hours(count()?);
                let time = NaiveTime::from_hms_opt(target.hour(), target.minute(), 0)?;
                Some((target.date(), time))
            }
            RelativeDay::InDays => Some((today + Duration::days(count()?), time)),
            RelativeDay::NextWeekend => {
                Some((today + Duration::days(days_until_saturday(now) + 7), time))
            }
            RelativeDay::ThisWeekend => Some((today + Duration::days(days_until_saturday(now)), time)),
            RelativeDay::NextWeek => Some((today + Duration::days(7), time)),
            RelativeDay::NextYear => Some((today.checked_add_months(Months::new(12))?, time)),
            RelativeDay::Tomorrow => Some((today + Duration::days(1), time)),
            RelativeDay::Tonight
            | RelativeDay::ThisMorning
            | RelativeDay::ThisAfternoon
            | RelativeDay::ThisEvening
            | RelativeDay::Today => Some((today, time)),
        }
    })
}

fn part_of_day(text: &str) -> Option<NaiveTime> {
    let caps = PART_OF_DAY.captures(text)?;
    let hour = match caps.get(1)?.as_str().to_ascii_lowercase().as_str() {
        "tonight" | "evening" => 18,
        "afternoon" => 14,
        "morning" => 9,
        _ => return None,
    };
    NaiveTime::from_hms_opt(hour, 0, 0)
}

fn resolve_weekday(text: &str, now: &DateTime<Tz>) -> Option<(NaiveDate, NaiveTime)> {
    let caps = WEEKDAY.captures(text)?;
    let name = caps.get(1)?.as_str().to_ascii_lowercase();
    let target = WEEKDAYS.iter().position(|day| *day == name)? as i64;
    let current = i64::from(now.weekday().num_days_from_sunday());
    let ahead = (target - current + 7) % 7;
    Some((now.date_naive() + Duration::days(ahead), now_time_of_day(now)))
}

fn resolve_month(word: &str) -> Option<u32> {
    let word = word.to_ascii_lowercase();
    if word.len() < 3 {
        return None;
    }
    MONTHS
        .iter()
        .position(|month| month.starts_with(&word))
        .map(|index| index as u32 + 1)
}

fn resolve_year(value: Option<&str>) -> Option<Option<i32>> {
    match value {
        None => Some(None),
        Some(raw) => {
            let year: i32 = raw.parse().ok()?;
            Some(Some(if raw.len() == 2 { 2000 + year } else { year }))
        }
    }
}

/// Calendar date for a month/day pair. Without an explicit year a date
/// already past this year rolls over to the next one.
fn build_date(today: NaiveDate, month: u32, day: u32, year: Option<i32>) -> Option<NaiveDate> {
    match year {
        Some(year) => NaiveDate::from_ymd_opt(year, month, day),
        None => {
            let candidate = NaiveDate::from_ymd_opt(today.year(), month, day)?;
            if candidate < today {
                NaiveDate::from_ymd_opt(today.year() + 1, month, day)
            } else {
                Some(candidate)
            }
        }
    }
}

fn month_day_from_captures(caps: &Captures, today: NaiveDate) -> Option<NaiveDate> {
    let month = resolve_month(caps.get(1)?.as_str())?;
    let day = caps.get(2)?.as_str().parse().ok()?;
    build_date(today, month, day, resolve_year(caps.get(3).map(|m| m.as_str()))?)
}

fn day_of_month_from_captures(caps: &Captures, today: NaiveDate) -> Option<NaiveDate> {
    let day = caps.get(1)?.as_str().parse().ok()?;
    let month = resolve_month(caps.get(2)?.as_str())?;
    build_date(today, month, day, resolve_year(caps.get(3).map(|m| m.as_str()))?)
}

fn slash_date_from_captures(caps: &Captures, today: NaiveDate) -> Option<NaiveDate> {
    let month = caps.get(1)?.as_str().parse().ok()?;
    let day = caps.get(2)?.as_str().parse().ok()?;
    build_date(today, month, day, resolve_year(caps.get(3).map(|m| m.as_str()))?)
}

type DateExtractor = fn(&Captures, NaiveDate) -> Option<NaiveDate>;

fn absolute_date_rules() -> [(&'static Lazy<Regex>, DateExtractor); 4] {
    [
        (&ON_MONTH_DAY, month_day_from_captures),
        (&ON_DAY_OF_MONTH, day_of_month_from_captures),
        (&SLASH_DATE, slash_date_from_captures),
        (&MONTH_DAY, month_day_from_captures),
    ]
}

fn resolve_absolute(text: &str, now: &DateTime<Tz>) -> Option<(NaiveDate, NaiveTime)> {
    let today = now.date_naive();
    let date = absolute_date_rules().into_iter().find_map(|(pattern, extract)| {
        pattern
            .captures_iter(text)
            .find_map(|caps| extract(&caps, today))
    })?;
    Some((date, NaiveTime::from_hms_opt(9, 0, 0)?))
}

/// `in N hours` is a time expression, so durations directly after "in" are skipped.
fn preceded_by_in(text: &str, start: usize) -> bool {
    let before = text[..start].trim_end().to_ascii_lowercase();
    before == "in" || before.ends_with(" in")
}

fn detect_duration(text: &str) -> Option<i64> {
    let combined = COMBINED_DURATION
        .captures_iter(text)
        .filter(|caps| caps.get(0).map_or(false, |m| !preceded_by_in(text, m.start())))
        .find_map(|caps| {
            let hours: i64 = caps.get(1)?.as_str().parse().ok()?;
            let minutes: i64 = caps.get(2)?.as_str().parse().ok()?;
            Some(hours * 60 + minutes)
        });
    if combined.is_some() {
        return combined;
    }

    let hours = HOUR_DURATION
        .captures_iter(text)
        .filter(|caps| caps.get(0).map_or(false, |m| !preceded_by_in(text, m.start())))
        .find_map(|caps| {
            let hours: f64 = caps.get(1)?.as_str().parse().ok()?;
            Some((hours * 60.0).round() as i64)
        });
    if hours.is_some() {
        return hours;
    }

    MINUTE_DURATION
        .captures_iter(text)
        .filter(|caps| caps.get(0).map_or(false, |m| !preceded_by_in(text, m.start())))
        .find_map(|caps| caps.get(1)?.as_str().parse().ok())
}

fn is_time_phrase(phrase: &str) -> bool {
    phrase
        .split_whitespace()
        .all(|word| TIME_PHRASE_WORDS.contains(&word.to_ascii_lowercase().as_str()))
}

fn detect_location(text: &str) -> Option<String> {
    if let Some(caps) = LOCATION_LABEL.captures(text) {
        let phrase = caps.name("phrase")?.as_str().trim();
        if !phrase.is_empty() {
            return Some(phrase.to_string());
        }
    }

    LOCATION.captures_iter(text).find_map(|caps| {
        let phrase = caps.name("phrase")?.as_str().trim();
        if phrase.is_empty() || is_time_phrase(phrase) {
            None
        } else {
            Some(phrase.to_string())
        }
    })
}

fn split_names(names: &str) -> Vec<String> {
    NAME_SEPARATOR
        .split(names)
        .map(|name| name.trim().trim_matches(',').trim())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

fn extract_attendees(text: &str) -> Vec<String> {
    let mut attendees: Vec<String> = Vec::new();
    for pattern in [&WITH_NAMES, &CALL_NAMES] {
        for caps in pattern.captures_iter(text) {
            let Some(names) = caps.name("names") else {
                continue;
            };
            for name in split_names(names.as_str()) {
                if !attendees.iter().any(|known| known.eq_ignore_ascii_case(&name)) {
                    attendees.push(name);
                }
            }
        }
        if !attendees.is_empty() {
            break;
        }
    }
    attendees
}

fn extract_tags(text: &str) -> Vec<String> {
    HASHTAG
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).map(|tag| tag.as_str().to_string()))
        .collect()
}

fn strip(text: &str, pattern: &Regex) -> String {
    pattern.replace_all(text, " ").into_owned()
}

/// Removes a phrase but keeps the token that terminated it.
fn strip_keeping_stop(text: &str, pattern: &Regex, keep: impl Fn(&Captures) -> bool) -> String {
    pattern
        .replace_all(text, |caps: &Captures| {
            if keep(caps) {
                return caps[0].to_string();
            }
            let stop = caps.name("stop").map_or("", |m| m.as_str());
            format!(" {stop}")
        })
        .into_owned()
}

fn clean_title(text: &str, priority: Option<TaskPriority>) -> String {
    let mut working = text.to_string();

    if let Some(priority) = priority {
        if let Some((_, pattern)) = PRIORITY_BUCKETS.iter().find(|(p, _)| *p == priority) {
            if priority == TaskPriority::High {
                working = NO_RUSH.replace_all(&working, "\u{0}").into_owned();
                working = strip(&working, pattern).replace('\u{0}', "no rush");
            } else {
                working = strip(&working, pattern);
            }
        }
    }

    for (_, pattern) in RELATIVE_RULES.iter() {
        working = strip(&working, pattern);
    }
    working = strip(&working, &WEEKDAY);
    working = strip(&working, &PART_OF_DAY);

    working = strip(&working, &AT_CLOCK);
    working = strip(&working, &BARE_CLOCK);

    let today = NaiveDate::from_ymd_opt(2000, 1, 1).unwrap_or_default();
    for (pattern, extract) in absolute_date_rules() {
        working = pattern
            .replace_all(&working, |caps: &Captures| {
                if extract(caps, today).is_some() {
                    " ".to_string()
                } else {
                    caps[0].to_string()
                }
            })
            .into_owned();
    }

    for pattern in [&COMBINED_DURATION, &HOUR_DURATION, &MINUTE_DURATION] {
        working = strip(&working, pattern);
    }
    for (_, pattern) in RECURRENCE_BUCKETS.iter() {
        working = strip(&working, pattern);
    }

    working = strip(&working, &LOCATION_LABEL);
    working = strip_keeping_stop(&working, &LOCATION, |caps| {
        caps.name("phrase")
            .map_or(true, |phrase| is_time_phrase(phrase.as_str().trim()))
    });
    working = strip_keeping_stop(&working, &WITH_NAMES, |_| false);
    working = strip(&working, &HASHTAG);

    finish_title(&working)
}

fn finish_title(working: &str) -> String {
    let collapsed = WHITESPACE.replace_all(working, " ");
    let mut words: Vec<&str> = collapsed.split(' ').filter(|w| !w.is_empty()).collect();

    loop {
        let trimmed = words.last().map(|word| {
            word.trim_matches(|ch: char| ch.is_ascii_punctuation())
                .to_ascii_lowercase()
        });
        match trimmed {
            Some(word) if word.is_empty() || DANGLING_WORDS.contains(&word.as_str()) => {
                words.pop();
            }
            _ => break,
        }
    }

    let title = words
        .join(" ")
        .trim_matches(|ch: char| ch.is_whitespace() || ch.is_ascii_punctuation())
        .to_string();

    if title.is_empty() {
        UNTITLED_TASK.to_string()
    } else {
        title
    }
}
