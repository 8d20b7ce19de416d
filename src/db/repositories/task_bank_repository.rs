use std::convert::TryFrom;

use rusqlite::{named_params, Connection, Row};

use crate::error::{AppError, AppResult};
use crate::models::task::{TaskBankItem, TaskCategory, TaskPriority};
use crate::services::schedule_utils::{format_datetime, parse_datetime};

const BASE_SELECT: &str = r#"
    SELECT
        id,
        title,
        priority,
        category,
        duration_minutes,
        scheduled,
        scheduled_start,
        scheduled_end,
        original_text,
        created_at
    FROM task_bank
"#;

#[derive(Debug, Clone)]
pub struct TaskBankRow {
    pub id: String,
    pub title: String,
    pub priority: String,
    pub category: Option<String>,
    pub duration_minutes: Option<i64>,
    pub scheduled: bool,
    pub scheduled_start: Option<String>,
    pub scheduled_end: Option<String>,
    pub original_text: Option<String>,
    pub created_at: String,
}

impl TaskBankRow {
    pub fn from_item(item: &TaskBankItem) -> Self {
        Self {
            id: item.id.clone(),
            title: item.title.clone(),
            priority: item.priority.as_str().to_string(),
            category: item.category.map(|category| category.as_str().to_string()),
            duration_minutes: item.duration_minutes,
            scheduled: item.scheduled,
            scheduled_start: item.scheduled_start.map(format_datetime),
            scheduled_end: item.scheduled_end.map(format_datetime),
            original_text: item.original_text.clone(),
            created_at: format_datetime(item.created_at),
        }
    }

    pub fn into_item(self) -> AppResult<TaskBankItem> {
        let priority = TaskPriority::parse(&self.priority).ok_or_else(|| {
            AppError::database(format!("unknown task priority '{}'", self.priority))
        })?;
        let category = match self.category.as_deref() {
            Some(raw) => Some(parse_category(raw)?),
            None => None,
        };

        Ok(TaskBankItem {
            id: self.id,
            title: self.title,
            priority,
            category,
            duration_minutes: self.duration_minutes,
            scheduled: self.scheduled,
            scheduled_start: self.scheduled_start.as_deref().map(parse_datetime).transpose()?,
            scheduled_end: self.scheduled_end.as_deref().map(parse_datetime).transpose()?,
            original_text: self.original_text,
            created_at: parse_datetime(&self.created_at)?,
        })
    }
}

fn parse_category(raw: &str) -> AppResult<TaskCategory> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|_| AppError::database(format!("unknown task category '{raw}'")))
}

impl TryFrom<&Row<'_>> for TaskBankRow {
    type Error = rusqlite::Error;

    fn try_from(row: &Row<'_>) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.get("id")?,
            title: row.get("title")?,
            priority: row.get("priority")?,
            category: row.get("category")?,
            duration_minutes: row.get("duration_minutes")?,
            scheduled: row.get::<_, i64>("scheduled")? != 0,
            scheduled_start: row.get("scheduled_start")?,
            scheduled_end: row.get("scheduled_end")?,
            original_text: row.get("original_text")?,
            created_at: row.get("created_at")?,
        })
    }
}

pub struct TaskBankRepository;

impl TaskBankRepository {
    pub fn insert(conn: &Connection, row: &TaskBankRow) -> AppResult<()> {
        conn.execute(
            r#"
                INSERT INTO task_bank (
                    id,
                    title,
                    priority,
                    category,
                    duration_minutes,
                    scheduled,
                    scheduled_start,
                    scheduled_end,
                    original_text,
                    created_at
                ) VALUES (
                    :id,
                    :title,
                    :priority,
                    :category,
                    :duration_minutes,
                    :scheduled,
                    :scheduled_start,
                    :scheduled_end,
                    :original_text,
                    :created_at
                )
            "#,
            named_params! {
                ":id": &row.id,
                ":title": &row.title,
                ":priority": &row.priority,
                ":category": &row.category,
                ":duration_minutes": &row.duration_minutes,
                ":scheduled": row.scheduled as i64,
                ":scheduled_start": &row.scheduled_start,
                ":scheduled_end": &row.scheduled_end,
                ":original_text": &row.original_text,
                ":created_at": &row.created_at,
            },
        )?;

        Ok(())
    }

    pub fn list_unscheduled(conn: &Connection) -> AppResult<Vec<TaskBankRow>> {
        let sql = format!("{BASE_SELECT} WHERE scheduled = 0 ORDER BY created_at ASC, id ASC");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], |row| TaskBankRow::try_from(row))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Scheduled items whose confirmed time intersects `[start, end)`.
    pub fn list_scheduled_between(
        conn: &Connection,
        start: &str,
        end: &str,
    ) -> AppResult<Vec<TaskBankRow>> {
        let sql = format!(
            "{BASE_SELECT} WHERE scheduled = 1 AND scheduled_start < :end AND scheduled_end > :start ORDER BY scheduled_start ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(named_params! {":start": start, ":end": end}, |row| {
                TaskBankRow::try_from(row)
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn mark_scheduled(conn: &Connection, id: &str, start: &str, end: &str) -> AppResult<()> {
        let affected = conn.execute(
            r#"
                UPDATE task_bank SET
                    scheduled = 1,
                    scheduled_start = :start,
                    scheduled_end = :end
                WHERE id = :id
            "#,
            named_params! {":id": id, ":start": start, ":end": end},
        )?;

        if affected == 0 {
            return Err(AppError::not_found());
        }
        Ok(())
    }
}
