use std::convert::TryFrom;

use rusqlite::{named_params, Connection, OptionalExtension, Row};

use crate::error::{AppError, AppResult};
use crate::models::event::{EventSource, StoredEvent};
use crate::services::schedule_utils::{format_datetime, parse_datetime};

const BASE_SELECT: &str = r#"
    SELECT
        id,
        title,
        start_at,
        end_at,
        source,
        color,
        created_at
    FROM events
"#;

#[derive(Debug, Clone)]
pub struct EventRow {
    pub id: String,
    pub title: String,
    pub start_at: String,
    pub end_at: String,
    pub source: String,
    pub color: Option<String>,
    pub created_at: String,
}

impl EventRow {
    pub fn from_event(event: &StoredEvent) -> Self {
        Self {
            id: event.id.clone(),
            title: event.title.clone(),
            start_at: format_datetime(event.start),
            end_at: format_datetime(event.end),
            source: event.source.as_str().to_string(),
            color: event.color.clone(),
            created_at: format_datetime(event.created_at),
        }
    }

    pub fn into_event(self) -> AppResult<StoredEvent> {
        let source = EventSource::parse(&self.source).ok_or_else(|| {
            AppError::database(format!("unknown event source '{}'", self.source))
        })?;

        Ok(StoredEvent {
            id: self.id,
            title: self.title,
            start: parse_datetime(&self.start_at)?,
            end: parse_datetime(&self.end_at)?,
            source,
            color: self.color,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

impl TryFrom<&Row<'_>> for EventRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.get("id")?,
            title: row.get("title")?,
            start_at: row.get("start_at")?,
            end_at: row.get("end_at")?,
            source: row.get("source")?,
            color: row.get("color")?,
            created_at: row.get("created_at")?,
        })
    }
}

pub struct EventRepository;

impl EventRepository {
    pub fn insert(conn: &Connection, row: &EventRow) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO events (id, title, start_at, end_at, source, color, created_at)
                VALUES (:id, :title, :start_at, :end_at, :source, :color, :created_at)
            "#,
            named_params! {
                ":id": &row.id,
                ":title": &row.title,
                ":start_at": &row.start_at,
                ":end_at": &row.end_at,
                ":source": &row.source,
                ":color": &row.color,
                ":created_at": &row.created_at,
            },
        )?;

        Ok(())
    }

    pub fn find_by_id(conn: &Connection, id: &str) -> AppResult<Option<EventRow>> {
        let sql = format!("{BASE_SELECT} WHERE id = :id");
        let mut stmt = conn.prepare(&sql)?;
        let row = stmt
            .query_row(named_params! {":id": id}, |row| EventRow::try_from(row))
            .optional()?;
        Ok(row)
    }

    /// Events that end after `after`, earliest first.
    pub fn list_ending_after(conn: &Connection, after: &str) -> AppResult<Vec<EventRow>> {
        let sql = format!("{BASE_SELECT} WHERE end_at > :after ORDER BY start_at ASC, id ASC");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(named_params! {":after": after}, |row| EventRow::try_from(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Events intersecting the half-open range `[start, end)`.
    pub fn list_overlapping(conn: &Connection, start: &str, end: &str) -> AppResult<Vec<EventRow>> {
        let sql = format!(
            "{BASE_SELECT} WHERE start_at < :end AND end_at > :start ORDER BY start_at ASC, id ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(named_params! {":start": start, ":end": end}, |row| {
                EventRow::try_from(row)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn delete(conn: &Connection, id: &str) -> AppResult<()> {
        let affected = conn.execute("DELETE FROM events WHERE id = ?1", [id])?;
        if affected == 0 {
            return Err(AppError::not_found());
        }
        Ok(())
    }
}
