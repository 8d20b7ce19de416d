use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, TimeZone, Utc};
use dayweave_lib::commands::suggestions::{
    suggestions_accept, suggestions_generate, AcceptSuggestionsRequest,
};
use dayweave_lib::commands::task::{
    task_bank_add, task_bank_list, tasks_parse_text, TaskBankAddRequest, TaskParseRequest,
};
use dayweave_lib::commands::AppState;
use dayweave_lib::db::DbPool;
use dayweave_lib::error::{AiErrorCode, AppError, AppResult};
use dayweave_lib::models::event::{CalendarInterval, EventSource, NewEvent};
use dayweave_lib::models::oracle::{OracleRequest, SuggestionOracle};
use dayweave_lib::models::suggestion::{
    BatchStatus, PreferredWindow, RawCandidate, SkipReason, SuggestionRequest,
};
use dayweave_lib::models::task::{TaskBankCreateInput, TaskPriority};
use dayweave_lib::services::calendar_provider::{CalendarProvider, NoCalendar, StaticCalendar};
use dayweave_lib::services::event_store::{
    EventStore, SqliteEventStore, SqliteTaskBankStore, TaskBankStore,
};
use dayweave_lib::services::suggestion_service::{SchedulingDeps, SuggestionScheduler};
use dayweave_lib::models::settings::SchedulingPolicy;
use dayweave_lib::utils::clock::FixedClock;
use tempfile::{tempdir, TempDir};

/// Replays queued responses and records every request it receives.
#[derive(Default)]
struct ScriptedOracle {
    responses: Mutex<VecDeque<Vec<RawCandidate>>>,
    requests: Mutex<Vec<OracleRequest>>,
}

impl ScriptedOracle {
    fn with(responses: Vec<Vec<RawCandidate>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<OracleRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl SuggestionOracle for ScriptedOracle {
    async fn suggest(&self, request: &OracleRequest) -> AppResult<Vec<RawCandidate>> {
        self.requests.lock().unwrap().push(request.clone());
        Ok(self.responses.lock().unwrap().pop_front().unwrap_or_default())
    }
}

struct DownOracle;

#[async_trait::async_trait]
impl SuggestionOracle for DownOracle {
    async fn suggest(&self, _request: &OracleRequest) -> AppResult<Vec<RawCandidate>> {
        Err(AppError::ai(AiErrorCode::OracleUnavailable, "oracle is down"))
    }
}

struct SlowOracle;

#[async_trait::async_trait]
impl SuggestionOracle for SlowOracle {
    async fn suggest(&self, _request: &OracleRequest) -> AppResult<Vec<RawCandidate>> {
        tokio::time::sleep(StdDuration::from_millis(500)).await;
        Ok(vec![RawCandidate::new("Take a walk", "High", "late")])
    }
}

fn utc(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 1, hour, minute, 0).unwrap()
}

fn state_with(
    oracle: Arc<dyn SuggestionOracle>,
    calendar: Arc<dyn CalendarProvider>,
    now: DateTime<Utc>,
) -> (TempDir, AppState) {
    let dir = tempdir().expect("temp dir");
    let pool = DbPool::new(dir.path().join("flow.db")).expect("db pool");
    let state =
        AppState::with_collaborators(pool, oracle, calendar, Arc::new(FixedClock(now)));
    (dir, state)
}

fn morning_request() -> SuggestionRequest {
    SuggestionRequest {
        mood: Some("focused".into()),
        environment: Some("home office".into()),
        weather: Some("cloudy".into()),
        time_zone: Some("UTC".into()),
        tags: vec!["wellbeing".into()],
        preferred_window: PreferredWindow::Morning,
        auto_accept: false,
    }
}

fn manual(title: &str, start: DateTime<Utc>, end: DateTime<Utc>) -> NewEvent {
    NewEvent {
        title: title.into(),
        start,
        end,
        source: EventSource::Manual,
        color: None,
    }
}

#[tokio::test]
async fn later_candidates_see_earlier_placements() {
    let oracle = ScriptedOracle::with(vec![vec![
        RawCandidate::new("Take a walk", "High", "fresh air"),
        RawCandidate::new("Call grandma", "Medium", "it has been a while"),
        RawCandidate::new("Read an article", "Low", "curiosity"),
    ]]);
    let (_dir, state) = state_with(oracle.clone(), Arc::new(NoCalendar), utc(7, 0));

    let batch = suggestions_generate(&state, morning_request())
        .await
        .expect("batch should be produced");

    assert_eq!(batch.status, BatchStatus::Scheduled);
    let spans: Vec<_> = batch
        .scheduled
        .iter()
        .map(|s| (s.title.as_str(), s.start, s.end))
        .collect();
    assert_eq!(
        spans,
        vec![
            ("Take a walk", utc(8, 0), utc(8, 30)),
            ("Call grandma", utc(9, 0), utc(9, 30)),
            ("Read an article", utc(10, 0), utc(10, 45)),
        ]
    );

    let buffer = Duration::minutes(30);
    for (i, earlier) in batch.scheduled.iter().enumerate() {
        for later in &batch.scheduled[i + 1..] {
            assert!(later.start >= earlier.end + buffer || later.end + buffer <= earlier.start);
        }
    }

    assert!(batch.scheduled.iter().all(|s| s.event_id.is_none()));
    assert_eq!(oracle.requests().len(), 1);
}

#[tokio::test]
async fn every_busy_source_blocks_placement() {
    let oracle = ScriptedOracle::with(vec![vec![RawCandidate::new(
        "Take a walk",
        "High",
        "stretch your legs",
    )]]);
    let calendar = StaticCalendar::new(vec![CalendarInterval {
        start: utc(9, 30),
        end: utc(10, 0),
        title: Some("Dentist".into()),
    }]);
    let (_dir, state) = state_with(oracle.clone(), Arc::new(calendar), utc(7, 0));

    state
        .events()
        .create_event(&manual("Team sync", utc(8, 0), utc(9, 0)))
        .expect("event stored");
    state
        .task_bank()
        .add(TaskBankCreateInput {
            title: "Prepare slides".into(),
            priority: TaskPriority::High,
            category: None,
            duration_minutes: None,
            scheduled_start: None,
            original_text: None,
        })
        .expect("task stored");

    let batch = suggestions_generate(&state, morning_request())
        .await
        .expect("batch should be produced");

    assert_eq!(batch.scheduled.len(), 1);
    assert_eq!(batch.scheduled[0].start, utc(10, 30));

    let sent = &oracle.requests()[0];
    assert_eq!(sent.calendar_conflicts.len(), 3);
    assert_eq!(sent.avoid_titles, Some(vec!["Team sync".to_string()]));
    assert_eq!(sent.time_window, "morning");
    assert_eq!(sent.tags, vec!["wellbeing".to_string()]);
}

#[tokio::test]
async fn invalid_and_duplicate_candidates_are_skipped() {
    let oracle = ScriptedOracle::with(vec![vec![
        RawCandidate::new("team sync", "High", "again"),
        RawCandidate::default(),
        RawCandidate::new("Stretch", "Urgent", "bad priority"),
        RawCandidate::new("Meditate", "low", "calm down"),
    ]]);
    let (_dir, state) = state_with(oracle, Arc::new(NoCalendar), utc(7, 0));
    state
        .events()
        .create_event(&manual("Team Sync", utc(8, 0), utc(9, 0)))
        .expect("event stored");

    let batch = suggestions_generate(&state, morning_request())
        .await
        .expect("batch should be produced");

    assert_eq!(batch.status, BatchStatus::PartiallyScheduled);
    assert_eq!(batch.scheduled.len(), 1);
    assert_eq!(batch.scheduled[0].title, "Meditate");
    assert_eq!(batch.scheduled[0].duration_minutes, 15);

    let reasons: Vec<_> = batch.skipped.iter().map(|s| s.reason).collect();
    assert_eq!(
        reasons,
        vec![SkipReason::Duplicate, SkipReason::Unparsable, SkipReason::Unparsable]
    );
}

#[tokio::test]
async fn empty_oracle_answer_means_nothing_suggested() {
    let oracle = ScriptedOracle::with(vec![Vec::new()]);
    let (_dir, state) = state_with(oracle, Arc::new(NoCalendar), utc(7, 0));

    let batch = suggestions_generate(&state, morning_request())
        .await
        .expect("batch should be produced");

    assert_eq!(batch.status, BatchStatus::NothingSuggested);
    assert!(batch.scheduled.is_empty());
    assert_eq!(batch.message, BatchStatus::NothingSuggested.message());
}

#[tokio::test]
async fn closed_window_skips_the_oracle() {
    let oracle = ScriptedOracle::with(vec![vec![RawCandidate::new("Take a walk", "High", "x")]]);
    let (_dir, state) = state_with(oracle.clone(), Arc::new(NoCalendar), utc(11, 45));

    let batch = suggestions_generate(&state, morning_request())
        .await
        .expect("batch should be produced");

    assert_eq!(batch.status, BatchStatus::TooLateToday);
    assert_eq!(batch.message, "it's too late to optimize today");
    assert!(oracle.requests().is_empty());
}

#[tokio::test]
async fn fully_booked_window_reports_no_slot() {
    let oracle = ScriptedOracle::with(vec![vec![RawCandidate::new("Take a walk", "High", "x")]]);
    let (_dir, state) = state_with(oracle, Arc::new(NoCalendar), utc(7, 0));
    state
        .events()
        .create_event(&manual("Workshop", utc(8, 0), utc(12, 0)))
        .expect("event stored");

    let batch = suggestions_generate(&state, morning_request())
        .await
        .expect("batch should be produced");

    assert_eq!(batch.status, BatchStatus::NoAvailableSlot);
    assert_eq!(batch.skipped[0].reason, SkipReason::NoSlotAvailable);
}

#[tokio::test]
async fn auto_accept_persists_the_whole_batch() {
    let oracle = ScriptedOracle::with(vec![vec![
        RawCandidate::new("Take a walk", "High", "fresh air"),
        RawCandidate::new("Journal", "Low", "reflect"),
    ]]);
    let (_dir, state) = state_with(oracle, Arc::new(NoCalendar), utc(7, 0));

    let mut request = morning_request();
    request.auto_accept = true;
    let batch = suggestions_generate(&state, request)
        .await
        .expect("batch should be produced");

    assert!(batch.scheduled.iter().all(|s| s.event_id.is_some()));

    let stored = state.events().list_events(utc(0, 0)).expect("list");
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|event| event.source == EventSource::Suggestion));
    assert_eq!(stored[0].title, "Take a walk");
    assert_eq!(stored[0].start, utc(8, 0));
}

#[tokio::test]
async fn accepted_suggestions_become_events_once() {
    let oracle = ScriptedOracle::with(vec![vec![RawCandidate::new("Take a walk", "High", "x")]]);
    let (_dir, state) = state_with(oracle, Arc::new(NoCalendar), utc(7, 0));

    let batch = suggestions_generate(&state, morning_request())
        .await
        .expect("batch should be produced");
    let accepted = suggestions_accept(
        &state,
        AcceptSuggestionsRequest {
            suggestions: batch.scheduled,
        },
    )
    .await
    .expect("accept should succeed");
    assert!(accepted[0].event_id.is_some());

    let again = suggestions_accept(
        &state,
        AcceptSuggestionsRequest {
            suggestions: accepted.clone(),
        },
    )
    .await
    .expect("accept should succeed");
    assert_eq!(again, accepted);
    assert_eq!(state.events().list_events(utc(0, 0)).expect("list").len(), 1);
}

#[tokio::test]
async fn missing_context_is_a_validation_error() {
    let oracle = ScriptedOracle::with(Vec::new());
    let (_dir, state) = state_with(oracle.clone(), Arc::new(NoCalendar), utc(7, 0));

    let mut request = morning_request();
    request.mood = None;
    let error = suggestions_generate(&state, request).await.unwrap_err();

    assert_eq!(error.code, "VALIDATION_ERROR");
    assert!(oracle.requests().is_empty());
}

#[tokio::test]
async fn oracle_failure_surfaces_as_command_error() {
    let (_dir, state) = state_with(Arc::new(DownOracle), Arc::new(NoCalendar), utc(7, 0));

    let error = suggestions_generate(&state, morning_request())
        .await
        .unwrap_err();

    assert_eq!(error.code, "ORACLE_UNAVAILABLE");
    assert!(error.message.starts_with("failed to generate suggestions"));
}

#[tokio::test]
async fn slow_batches_time_out() {
    let dir = tempdir().expect("temp dir");
    let pool = DbPool::new(dir.path().join("slow.db")).expect("db pool");
    let deps = SchedulingDeps {
        oracle: Arc::new(SlowOracle),
        events: Arc::new(SqliteEventStore::new(pool.clone())),
        tasks: Arc::new(SqliteTaskBankStore::new(pool)),
        calendar: Arc::new(NoCalendar),
        clock: Arc::new(FixedClock(utc(7, 0))),
    };
    let scheduler = SuggestionScheduler::new(deps, SchedulingPolicy::default());

    let error = scheduler
        .generate_within(&morning_request(), StdDuration::from_millis(50))
        .await
        .unwrap_err();

    assert_eq!(error.ai_code(), Some(AiErrorCode::HttpTimeout));
}

#[tokio::test]
async fn persisted_policy_changes_placement() {
    let oracle = ScriptedOracle::with(vec![vec![RawCandidate::new("Take a walk", "High", "x")]]);
    let (_dir, state) = state_with(oracle, Arc::new(NoCalendar), utc(7, 0));
    state
        .events()
        .create_event(&manual("Team sync", utc(8, 0), utc(9, 0)))
        .expect("event stored");
    state
        .settings()
        .update_scheduling_policy(dayweave_lib::models::settings::SchedulingPolicyUpdate {
            buffer_minutes: Some(0),
            ..Default::default()
        })
        .expect("policy updated");

    let batch = suggestions_generate(&state, morning_request())
        .await
        .expect("batch should be produced");

    assert_eq!(batch.scheduled[0].start, utc(9, 0));
}

#[tokio::test]
async fn dated_bank_tasks_do_not_block_today() {
    let oracle = ScriptedOracle::with(vec![vec![RawCandidate::new(
        "Take a walk",
        "High",
        "fresh air",
    )]]);
    let (_dir, state) = state_with(oracle.clone(), Arc::new(NoCalendar), utc(7, 0));

    let item = task_bank_add(
        &state,
        TaskBankAddRequest {
            text: Some("urgent dentist tomorrow at 3pm".into()),
            descriptor: None,
            time_zone: Some("UTC".into()),
        },
    )
    .await
    .expect("task should be stored");

    let tomorrow_three = utc(15, 0) + Duration::days(1);
    assert!(item.scheduled);
    assert_eq!(item.scheduled_start, Some(tomorrow_three));
    assert_eq!(item.scheduled_end, Some(tomorrow_three + Duration::minutes(60)));
    assert!(task_bank_list(&state).await.expect("list").is_empty());

    let batch = suggestions_generate(&state, morning_request())
        .await
        .expect("batch should be produced");

    assert_eq!(batch.scheduled.len(), 1);
    assert_eq!(batch.scheduled[0].start, utc(8, 0));
    assert!(oracle.requests()[0].calendar_conflicts.is_empty());
}

#[tokio::test]
async fn oversized_bank_durations_are_rejected() {
    let oracle = ScriptedOracle::with(vec![vec![RawCandidate::new(
        "Take a walk",
        "High",
        "fresh air",
    )]]);
    let (_dir, state) = state_with(oracle, Arc::new(NoCalendar), utc(7, 0));

    let mut descriptor = tasks_parse_text(
        &state,
        TaskParseRequest {
            text: "sort the attic".into(),
            time_zone: Some("UTC".into()),
        },
    )
    .await
    .expect("text should parse");
    descriptor.duration = Some(1_000_000_000_000_000);

    let error = task_bank_add(
        &state,
        TaskBankAddRequest {
            text: None,
            descriptor: Some(descriptor),
            time_zone: None,
        },
    )
    .await
    .unwrap_err();
    assert_eq!(error.code, "VALIDATION_ERROR");

    let batch = suggestions_generate(&state, morning_request())
        .await
        .expect("batch should be produced");
    assert_eq!(batch.scheduled[0].start, utc(8, 0));
}
