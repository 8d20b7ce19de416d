use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use dayweave_lib::commands::suggestions::{suggestions_generate, suggestions_retry};
use dayweave_lib::commands::AppState;
use dayweave_lib::db::DbPool;
use dayweave_lib::error::AppResult;
use dayweave_lib::models::event::{EventSource, NewEvent};
use dayweave_lib::models::oracle::{OracleRequest, SuggestionOracle};
use dayweave_lib::models::suggestion::{
    PreferredWindow, RawCandidate, RetryOutcome, RetryRequest, RetryUnavailableReason,
    ScheduledSuggestion, SuggestionPriority, SuggestionRequest,
};
use dayweave_lib::services::calendar_provider::NoCalendar;
use dayweave_lib::utils::clock::FixedClock;
use dayweave_lib::utils::similarity::text_similarity;
use tempfile::{tempdir, TempDir};

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

fn utc(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 5, 1, hour, minute, 0).unwrap()
}

fn setup(oracle: Arc<ScriptedOracle>) -> (TempDir, AppState) {
    let dir = tempdir().expect("temp dir");
    let pool = DbPool::new(dir.path().join("retry.db")).expect("db pool");
    let state = AppState::with_collaborators(
        pool,
        oracle,
        Arc::new(NoCalendar),
        Arc::new(FixedClock(utc(7, 0))),
    );
    (dir, state)
}

fn context(auto_accept: bool) -> SuggestionRequest {
    SuggestionRequest {
        mood: Some("tired".into()),
        environment: Some("living room".into()),
        weather: Some("rain".into()),
        time_zone: Some("UTC".into()),
        tags: Vec::new(),
        preferred_window: PreferredWindow::Morning,
        auto_accept,
    }
}

fn unsaved(title: &str) -> ScheduledSuggestion {
    ScheduledSuggestion {
        title: title.into(),
        priority: SuggestionPriority::Medium,
        reason: "quiet time".into(),
        start: utc(8, 0),
        end: utc(8, 45),
        duration_minutes: 45,
        event_id: None,
    }
}

fn retry_request(rejected: ScheduledSuggestion, previously_rejected: Vec<String>) -> RetryRequest {
    RetryRequest {
        rejected,
        context: context(false),
        previously_rejected,
    }
}

#[tokio::test]
async fn close_variation_is_not_a_replacement() {
    let oracle = ScriptedOracle::with(vec![vec![RawCandidate::new(
        "Read for pleasure",
        "Medium",
        "you like books",
    )]]);
    let (_dir, state) = setup(oracle.clone());

    assert_eq!(
        text_similarity("Read for pleasure", "Read a book for 30 minutes"),
        0.8
    );

    let outcome = suggestions_retry(
        &state,
        retry_request(unsaved("Read a book for 30 minutes"), Vec::new()),
    )
    .await
    .expect("retry should complete");

    assert_eq!(
        outcome,
        RetryOutcome::unavailable(RetryUnavailableReason::NoDistinctSuggestion)
    );
    match outcome {
        RetryOutcome::Unavailable { message, .. } => {
            assert_eq!(message, "no sufficiently different suggestion is available")
        }
        other => panic!("unexpected outcome: {other:?}"),
    }

    let sent = &oracle.requests()[0];
    assert_eq!(
        sent.retry_hint.as_deref(),
        Some(r#"User rejected "Read a book for 30 minutes", suggest something different"#)
    );
    assert_eq!(
        sent.avoid_titles,
        Some(vec!["Read a book for 30 minutes".to_string()])
    );
}

#[tokio::test]
async fn persisted_rejection_is_swapped_in_place() {
    let oracle = ScriptedOracle::with(vec![
        vec![RawCandidate::new("Read a book for 30 minutes", "Medium", "quiet")],
        vec![
            RawCandidate::new("Read a novel", "Medium", "still reading"),
            RawCandidate::new("Take a walk", "High", "rain stopped"),
        ],
    ]);
    let (_dir, state) = setup(oracle.clone());

    let batch = suggestions_generate(&state, context(true))
        .await
        .expect("batch should be produced");
    let rejected = batch.scheduled[0].clone();
    assert_eq!(rejected.start, utc(8, 0));
    assert!(rejected.event_id.is_some());

    let outcome = suggestions_retry(&state, retry_request(rejected.clone(), Vec::new()))
        .await
        .expect("retry should complete");

    let replacement = outcome.replacement().expect("replacement expected").clone();
    assert_eq!(replacement.title, "Take a walk");
    assert_eq!(replacement.start, utc(8, 0));
    assert!(replacement.event_id.is_some());
    assert_ne!(replacement.event_id, rejected.event_id);

    let stored = state.events().list_events(utc(0, 0)).expect("list");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].title, "Take a walk");
    assert_eq!(stored[0].source, EventSource::Suggestion);

    let sent = &oracle.requests()[1];
    assert!(sent.calendar_conflicts.is_empty());
}

#[tokio::test]
async fn deleted_rejection_ends_without_asking() {
    let oracle = ScriptedOracle::with(vec![vec![RawCandidate::new("Take a walk", "High", "x")]]);
    let (_dir, state) = setup(oracle.clone());

    let mut rejected = unsaved("Stretch");
    rejected.event_id = Some("missing-event".into());

    let outcome = suggestions_retry(&state, retry_request(rejected, Vec::new()))
        .await
        .expect("retry should complete");

    assert_eq!(
        outcome,
        RetryOutcome::unavailable(RetryUnavailableReason::NoDistinctSuggestion)
    );
    assert!(oracle.requests().is_empty());
}

#[tokio::test]
async fn earlier_rejections_stay_excluded() {
    let oracle = ScriptedOracle::with(vec![vec![
        RawCandidate::new("Go for a run", "High", "energy"),
        RawCandidate::new("Water the plants", "Low", "they look dry"),
    ]]);
    let (_dir, state) = setup(oracle.clone());

    let outcome = suggestions_retry(
        &state,
        retry_request(unsaved("Bake bread"), vec!["Go for a run".into()]),
    )
    .await
    .expect("retry should complete");

    let replacement = outcome.replacement().expect("replacement expected");
    assert_eq!(replacement.title, "Water the plants");
    assert_eq!(replacement.event_id, None);
    assert!(state.events().list_events(utc(0, 0)).expect("list").is_empty());

    let sent = &oracle.requests()[0];
    assert_eq!(
        sent.avoid_titles,
        Some(vec!["Bake bread".to_string(), "Go for a run".to_string()])
    );
}

#[tokio::test]
async fn replacement_without_room_is_unavailable() {
    let oracle = ScriptedOracle::with(vec![vec![RawCandidate::new("Take a walk", "High", "x")]]);
    let (_dir, state) = setup(oracle);
    state
        .events()
        .create_event(&NewEvent {
            title: "Workshop".into(),
            start: utc(8, 0),
            end: utc(12, 0),
            source: EventSource::Manual,
            color: None,
        })
        .expect("event stored");

    let outcome = suggestions_retry(&state, retry_request(unsaved("Bake bread"), Vec::new()))
        .await
        .expect("retry should complete");

    assert_eq!(
        outcome,
        RetryOutcome::unavailable(RetryUnavailableReason::NoAvailableSlot)
    );
}

#[tokio::test]
async fn retry_context_is_validated() {
    let oracle = ScriptedOracle::with(Vec::new());
    let (_dir, state) = setup(oracle);

    let mut request = retry_request(unsaved("Bake bread"), Vec::new());
    request.context.time_zone = None;

    let error = suggestions_retry(&state, request).await.unwrap_err();
    assert_eq!(error.code, "VALIDATION_ERROR");
}
