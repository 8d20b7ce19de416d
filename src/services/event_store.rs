use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::{debug, info};

use crate::db::repositories::event_repository::{EventRepository, EventRow};
use crate::db::repositories::task_bank_repository::{TaskBankRepository, TaskBankRow};
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::event::{NewEvent, StoredEvent};
use crate::models::task::{TaskBankCreateInput, TaskBankItem};
use crate::services::schedule_utils::{
    format_datetime, infer_duration_minutes, truncate_to_minute,
};

/// Longest duration a banked task may claim.
pub const MAX_TASK_DURATION_MINUTES: i64 = 24 * 60;

/// Persisted calendar entries.
pub trait EventStore: Send + Sync {
    fn create_event(&self, event: &NewEvent) -> AppResult<String>;

    /// Inserts every event or none of them.
    fn create_events(&self, events: &[NewEvent]) -> AppResult<Vec<String>>;

    /// Events that end after `after`, earliest first.
    fn list_events(&self, after: DateTime<Utc>) -> AppResult<Vec<StoredEvent>>;

    /// Events intersecting `[start, end)`.
    fn list_between(&self, start: DateTime<Utc>, end: DateTime<Utc>)
        -> AppResult<Vec<StoredEvent>>;

    /// Fails with `NotFound` when the id is unknown.
    fn get_event(&self, id: &str) -> AppResult<StoredEvent>;

    /// Deletes `old_id` and inserts `replacement` atomically.
    fn replace_event(&self, old_id: &str, replacement: &NewEvent) -> AppResult<String>;
}

/// Tasks captured from free text and not yet on the calendar.
pub trait TaskBankStore: Send + Sync {
    fn add(&self, input: TaskBankCreateInput) -> AppResult<TaskBankItem>;

    fn list_unscheduled(&self) -> AppResult<Vec<TaskBankItem>>;

    fn list_scheduled_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<TaskBankItem>>;

    fn mark_scheduled(&self, id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> AppResult<()>;
}

fn validate_new_event(event: &NewEvent) -> AppResult<()> {
    if event.title.trim().is_empty() {
        return Err(AppError::validation("event title must not be empty"));
    }
    if event.start >= event.end {
        return Err(AppError::validation_with_details(
            "event must end after it starts",
            json!({"start": format_datetime(event.start), "end": format_datetime(event.end)}),
        ));
    }
    Ok(())
}

fn new_event_row(event: &NewEvent) -> AppResult<EventRow> {
    validate_new_event(event)?;
    Ok(EventRow {
        id: uuid::Uuid::new_v4().to_string(),
        title: event.title.trim().to_string(),
        start_at: format_datetime(event.start),
        end_at: format_datetime(event.end),
        source: event.source.as_str().to_string(),
        color: event
            .color
            .clone()
            .or_else(|| Some(event.source.default_color().to_string())),
        created_at: format_datetime(Utc::now()),
    })
}

fn rows_into_events(rows: Vec<EventRow>) -> AppResult<Vec<StoredEvent>> {
    rows.into_iter().map(EventRow::into_event).collect()
}

#[derive(Clone)]
pub struct SqliteEventStore {
    db: DbPool,
}

impl SqliteEventStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

impl EventStore for SqliteEventStore {
    fn create_event(&self, event: &NewEvent) -> AppResult<String> {
        let row = new_event_row(event)?;
        self.db
            .with_connection(|conn| EventRepository::insert(conn, &row))?;
        info!(target: "app::db", event_id = %row.id, source = %row.source, "event created");
        Ok(row.id)
    }

    fn create_events(&self, events: &[NewEvent]) -> AppResult<Vec<String>> {
        let rows = events
            .iter()
            .map(new_event_row)
            .collect::<AppResult<Vec<_>>>()?;

        self.db.with_transaction(|tx| {
            for row in &rows {
                EventRepository::insert(tx, row)?;
            }
            Ok(())
        })?;

        info!(target: "app::db", count = rows.len(), "events created");
        Ok(rows.into_iter().map(|row| row.id).collect())
    }

    fn list_events(&self, after: DateTime<Utc>) -> AppResult<Vec<StoredEvent>> {
        let after = format_datetime(after);
        let rows = self
            .db
            .with_connection(|conn| EventRepository::list_ending_after(conn, &after))?;
        debug!(target: "app::db", count = rows.len(), "events listed");
        rows_into_events(rows)
    }

    fn list_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<StoredEvent>> {
        let (start, end) = (format_datetime(start), format_datetime(end));
        let rows = self
            .db
            .with_connection(|conn| EventRepository::list_overlapping(conn, &start, &end))?;
        rows_into_events(rows)
    }

    fn get_event(&self, id: &str) -> AppResult<StoredEvent> {
        self.db
            .with_connection(|conn| EventRepository::find_by_id(conn, id))?
            .ok_or_else(AppError::not_found)?
            .into_event()
    }

    fn replace_event(&self, old_id: &str, replacement: &NewEvent) -> AppResult<String> {
        let row = new_event_row(replacement)?;
        self.db.with_transaction(|tx| {
            EventRepository::delete(tx, old_id)?;
            EventRepository::insert(tx, &row)
        })?;
        info!(
            target: "app::db",
            replaced = %old_id,
            event_id = %row.id,
            "event replaced"
        );
        Ok(row.id)
    }
}

#[derive(Clone)]
pub struct SqliteTaskBankStore {
    db: DbPool,
}

impl SqliteTaskBankStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

fn rows_into_items(rows: Vec<TaskBankRow>) -> AppResult<Vec<TaskBankItem>> {
    rows.into_iter().map(TaskBankRow::into_item).collect()
}

impl TaskBankStore for SqliteTaskBankStore {
    fn add(&self, input: TaskBankCreateInput) -> AppResult<TaskBankItem> {
        let title = input.title.trim();
        if title.is_empty() {
            return Err(AppError::validation("task title must not be empty"));
        }
        if let Some(minutes) = input.duration_minutes {
            if minutes <= 0 {
                return Err(AppError::validation_with_details(
                    "task duration must be positive",
                    json!({"durationMinutes": minutes}),
                ));
            }
            if minutes > MAX_TASK_DURATION_MINUTES {
                return Err(AppError::validation_with_details(
                    "task duration must not exceed one day",
                    json!({
                        "durationMinutes": minutes,
                        "maxMinutes": MAX_TASK_DURATION_MINUTES,
                    }),
                ));
            }
        }

        let slot = match input.scheduled_start {
            Some(start) => {
                let minutes = input
                    .duration_minutes
                    .unwrap_or_else(|| infer_duration_minutes(title, input.priority));
                let start = truncate_to_minute(start);
                let end = Duration::try_minutes(minutes)
                    .and_then(|length| start.checked_add_signed(length))
                    .ok_or_else(|| {
                        AppError::validation_with_details(
                            "task time is out of range",
                            json!({"scheduledStart": format_datetime(start)}),
                        )
                    })?;
                Some((start, end))
            }
            None => None,
        };

        let item = TaskBankItem {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.to_string(),
            priority: input.priority,
            category: input.category,
            duration_minutes: input.duration_minutes,
            scheduled: slot.is_some(),
            scheduled_start: slot.map(|(start, _)| start),
            scheduled_end: slot.map(|(_, end)| end),
            original_text: input.original_text,
            created_at: truncate_to_minute(Utc::now()),
        };

        let row = TaskBankRow::from_item(&item);
        self.db
            .with_connection(|conn| TaskBankRepository::insert(conn, &row))?;
        info!(
            target: "app::db",
            task_id = %item.id,
            scheduled = item.scheduled,
            "task added to bank"
        );
        Ok(item)
    }

    fn list_unscheduled(&self) -> AppResult<Vec<TaskBankItem>> {
        let rows = self.db.with_connection(TaskBankRepository::list_unscheduled)?;
        rows_into_items(rows)
    }

    fn list_scheduled_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> AppResult<Vec<TaskBankItem>> {
        let (start, end) = (format_datetime(start), format_datetime(end));
        let rows = self.db.with_connection(|conn| {
            TaskBankRepository::list_scheduled_between(conn, &start, &end)
        })?;
        rows_into_items(rows)
    }

    fn mark_scheduled(&self, id: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> AppResult<()> {
        if start >= end {
            return Err(AppError::validation("scheduled task must end after it starts"));
        }
        let (start, end) = (format_datetime(start), format_datetime(end));
        self.db
            .with_connection(|conn| TaskBankRepository::mark_scheduled(conn, id, &start, &end))?;
        info!(target: "app::db", task_id = %id, "task scheduled");
        Ok(())
    }
}
