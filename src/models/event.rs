use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

pub const SOURCE_CALENDAR: &str = "calendar";
pub const SOURCE_STORED: &str = "stored";
pub const SOURCE_TASK_BANK: &str = "task-bank";
pub const SOURCE_SUGGESTION: &str = "suggestion";

/// A time range during which the user is unavailable for new placements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BusyInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub source_label: String,
}

impl BusyInterval {
    /// Returns `None` for empty or inverted ranges.
    pub fn new(
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        source_label: impl Into<String>,
    ) -> Option<Self> {
        if start >= end {
            return None;
        }
        Some(Self {
            start,
            end,
            source_label: source_label.into(),
        })
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }

    pub fn padded(&self, buffer_minutes: i64) -> (DateTime<Utc>, DateTime<Utc>) {
        let buffer = Duration::minutes(buffer_minutes.max(0));
        (self.start - buffer, self.end + buffer)
    }
}

/// A plain interval as delivered by a calendar or the local store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventSource {
    Suggestion,
    TaskBank,
    Manual,
}

impl EventSource {
    pub fn as_str(self) -> &'static str {
        match self {
            EventSource::Suggestion => "suggestion",
            EventSource::TaskBank => "task-bank",
            EventSource::Manual => "manual",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "suggestion" => Some(EventSource::Suggestion),
            "task-bank" => Some(EventSource::TaskBank),
            "manual" => Some(EventSource::Manual),
            _ => None,
        }
    }

    pub fn default_color(self) -> &'static str {
        match self {
            EventSource::Suggestion => "#7c3aed",
            EventSource::TaskBank => "#0ea5e9",
            EventSource::Manual => "#64748b",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEvent {
    pub id: String,
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub source: EventSource,
    #[serde(default)]
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StoredEvent {
    pub fn as_interval(&self) -> CalendarInterval {
        CalendarInterval {
            start: self.start,
            end: self.end,
            title: Some(self.title.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewEvent {
    pub title: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub source: EventSource,
    #[serde(default)]
    pub color: Option<String>,
}
