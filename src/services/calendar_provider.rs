use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::AppResult;
use crate::models::event::CalendarInterval;

/// Read access to an externally synced calendar.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// Entries intersecting `[start, end)`.
    async fn fetch_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<CalendarInterval>>;
}

/// Used when no calendar account is connected.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCalendar;

#[async_trait]
impl CalendarProvider for NoCalendar {
    async fn fetch_events(
        &self,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> AppResult<Vec<CalendarInterval>> {
        Ok(Vec::new())
    }
}

/// A fixed set of entries, e.g. a snapshot handed over by the host app.
#[derive(Debug, Clone, Default)]
pub struct StaticCalendar {
    entries: Vec<CalendarInterval>,
}

impl StaticCalendar {
    pub fn new(entries: Vec<CalendarInterval>) -> Self {
        Self { entries }
    }
}

#[async_trait]
impl CalendarProvider for StaticCalendar {
    async fn fetch_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<CalendarInterval>> {
        Ok(self
            .entries
            .iter()
            .filter(|entry| entry.start < end && entry.end > start)
            .cloned()
            .collect())
    }
}
