use std::sync::Arc;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use dayweave_lib::commands::task::{
    task_bank_add, task_bank_list, tasks_parse_text, TaskBankAddRequest, TaskParseRequest,
};
use dayweave_lib::commands::AppState;
use dayweave_lib::db::DbPool;
use dayweave_lib::models::suggestion::RawCandidate;
use dayweave_lib::models::task::{TaskCategory, TaskPriority};
use dayweave_lib::models::oracle::{OracleRequest, SuggestionOracle};
use dayweave_lib::error::AppResult;
use dayweave_lib::services::calendar_provider::NoCalendar;
use dayweave_lib::utils::clock::FixedClock;
use tempfile::{tempdir, TempDir};

struct SilentOracle;

#[async_trait::async_trait]
impl SuggestionOracle for SilentOracle {
    async fn suggest(&self, _request: &OracleRequest) -> AppResult<Vec<RawCandidate>> {
        Ok(Vec::new())
    }
}

fn thursday_morning() -> DateTime<Utc> {
    // 2025-05-01 10:00 in New York.
    Utc.with_ymd_and_hms(2025, 5, 1, 14, 0, 0).unwrap()
}

fn setup() -> (TempDir, AppState) {
    let dir = tempdir().expect("temp dir");
    let pool = DbPool::new(dir.path().join("parse.db")).expect("db pool");
    let state = AppState::with_collaborators(
        pool,
        Arc::new(SilentOracle),
        Arc::new(NoCalendar),
        Arc::new(FixedClock(thursday_morning())),
    );
    (dir, state)
}

fn request(text: &str) -> TaskParseRequest {
    TaskParseRequest {
        text: text.to_string(),
        time_zone: Some("America/New_York".to_string()),
    }
}

#[tokio::test]
async fn urgent_call_is_scheduled_tomorrow_afternoon() {
    let (_dir, state) = setup();

    let task = tasks_parse_text(&state, request("urgent call mom tomorrow at 3pm"))
        .await
        .expect("parse should succeed");

    assert_eq!(task.priority, TaskPriority::High);
    assert_eq!(task.category, Some(TaskCategory::Personal));
    assert!(task.scheduled);
    assert_eq!(task.title, "call mom");
    let timestamp = task.timestamp.expect("timestamp");
    assert_eq!(timestamp.to_rfc3339(), "2025-05-02T15:00:00-04:00");
    assert_eq!(task.original_text, "urgent call mom tomorrow at 3pm");
}

#[tokio::test]
async fn weekend_shopping_lands_on_saturday() {
    let (_dir, state) = setup();

    let task = tasks_parse_text(&state, request("grocery shopping this weekend"))
        .await
        .expect("parse should succeed");

    assert!(task.scheduled);
    assert_eq!(
        task.timestamp.expect("timestamp").date_naive(),
        NaiveDate::from_ymd_opt(2025, 5, 3).unwrap()
    );
    assert_eq!(task.duration, None);
    assert_eq!(task.title, "grocery shopping");
}

#[tokio::test]
async fn descriptor_serializes_camel_case_without_empty_fields() {
    let (_dir, state) = setup();

    let task = tasks_parse_text(&state, request("Gym every week for 45 minutes #fitness"))
        .await
        .expect("parse should succeed");
    let value = serde_json::to_value(&task).expect("serializable");

    assert_eq!(value["duration"], 45);
    assert_eq!(value["recurring"]["type"], "weekly");
    assert_eq!(value["tags"][0], "fitness");
    assert!(value.get("originalText").is_some());
    assert!(value.get("attendees").is_none());
    assert!(value.get("location").is_none());
}

#[tokio::test]
async fn blank_text_is_rejected() {
    let (_dir, state) = setup();

    let error = tasks_parse_text(&state, request("   ")).await.unwrap_err();
    assert_eq!(error.code, "VALIDATION_ERROR");
}

#[tokio::test]
async fn parsed_text_goes_into_the_task_bank() {
    let (_dir, state) = setup();

    let item = task_bank_add(
        &state,
        TaskBankAddRequest {
            text: Some("Write the quarterly report for 2 hours, important".into()),
            descriptor: None,
            time_zone: Some("America/New_York".into()),
        },
    )
    .await
    .expect("task should be stored");

    assert_eq!(item.priority, TaskPriority::High);
    assert_eq!(item.duration_minutes, Some(120));
    assert!(!item.scheduled);

    let bank = task_bank_list(&state).await.expect("list");
    assert_eq!(bank.len(), 1);
    assert_eq!(bank[0].id, item.id);
}

#[tokio::test]
async fn task_bank_requires_input() {
    let (_dir, state) = setup();

    let error = task_bank_add(
        &state,
        TaskBankAddRequest {
            text: None,
            descriptor: None,
            time_zone: None,
        },
    )
    .await
    .unwrap_err();

    assert_eq!(error.code, "VALIDATION_ERROR");
}
