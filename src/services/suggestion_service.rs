use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde_json::json;
use tracing::{debug, error, info};

use crate::error::{AiErrorCode, AppError, AppResult};
use crate::models::event::{BusyInterval, CalendarInterval, SOURCE_SUGGESTION};
use crate::models::oracle::{OracleConflict, OracleRequest, SuggestionOracle};
use crate::models::settings::SchedulingPolicy;
use crate::models::suggestion::{
    BatchStatus, PlacementResult, RawCandidate, ScheduledSuggestion, SkipReason,
    SkippedSuggestion, SuggestionBatch, SuggestionContext, SuggestionRequest,
};
use crate::services::calendar_provider::CalendarProvider;
use crate::services::conflict_builder::{ConflictSetBuilder, ConflictSources};
use crate::services::event_store::{EventStore, TaskBankStore};
use crate::services::schedule_utils::{infer_duration_minutes, local_day_bounds, resolve_timezone};
use crate::services::slot_finder::{SlotFinder, SlotRequest};
use crate::utils::clock::Clock;

/// Collaborators shared by the scheduler and the retry resolver.
#[derive(Clone)]
pub struct SchedulingDeps {
    pub oracle: Arc<dyn SuggestionOracle>,
    pub events: Arc<dyn EventStore>,
    pub tasks: Arc<dyn TaskBankStore>,
    pub calendar: Arc<dyn CalendarProvider>,
    pub clock: Arc<dyn Clock>,
}

/// What today already looks like for one scheduling request.
#[derive(Debug, Clone, Default)]
pub struct DaySnapshot {
    pub busy: Vec<BusyInterval>,
    pub scheduled_titles: Vec<String>,
}

impl DaySnapshot {
    /// Gathers calendar, stored events and task bank for the local day of
    /// `now`. A stored event whose id equals `exclude_event_id` is left out
    /// entirely, so its slot and title are free again.
    pub async fn collect(
        deps: &SchedulingDeps,
        time_zone: &Tz,
        now: DateTime<Utc>,
        exclude_event_id: Option<&str>,
    ) -> AppResult<Self> {
        let (day_start, day_end) = local_day_bounds(now, time_zone);

        let synced = deps.calendar.fetch_events(day_start, day_end).await?;
        let stored: Vec<_> = deps
            .events
            .list_between(day_start, day_end)?
            .into_iter()
            .filter(|event| Some(event.id.as_str()) != exclude_event_id)
            .collect();
        let mut tasks = deps.tasks.list_unscheduled()?;
        let scheduled_tasks = deps.tasks.list_scheduled_between(day_start, day_end)?;

        let mut scheduled_titles: Vec<String> =
            stored.iter().map(|event| event.title.clone()).collect();
        scheduled_titles.extend(scheduled_tasks.iter().map(|item| item.title.clone()));
        tasks.extend(scheduled_tasks);

        let stored_intervals: Vec<CalendarInterval> =
            stored.iter().map(|event| event.as_interval()).collect();
        let busy = ConflictSetBuilder::new().build(
            &ConflictSources {
                synced: &synced,
                stored: &stored_intervals,
                unscheduled_tasks: &tasks,
            },
            now,
            time_zone,
        );

        Ok(Self {
            busy,
            scheduled_titles,
        })
    }

    pub fn oracle_conflicts(&self) -> Vec<OracleConflict> {
        self.busy.iter().map(OracleConflict::from).collect()
    }
}

/// Checks the required context fields and resolves the time zone.
pub fn validate_context(request: &SuggestionRequest) -> AppResult<SuggestionContext> {
    fn required(value: &Option<String>) -> Option<String> {
        value
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    }

    let mood = required(&request.mood);
    let environment = required(&request.environment);
    let weather = required(&request.weather);
    let time_zone = required(&request.time_zone);

    let missing: Vec<&str> = [
        ("mood", mood.is_none()),
        ("environment", environment.is_none()),
        ("weather", weather.is_none()),
        ("timeZone", time_zone.is_none()),
    ]
    .into_iter()
    .filter_map(|(name, absent)| absent.then_some(name))
    .collect();

    match (mood, environment, weather, time_zone) {
        (Some(mood), Some(environment), Some(weather), Some(time_zone)) => {
            Ok(SuggestionContext {
                mood,
                environment,
                weather,
                time_zone: resolve_timezone(&time_zone),
                tags: request
                    .tags
                    .iter()
                    .map(|tag| tag.trim().to_string())
                    .filter(|tag| !tag.is_empty())
                    .collect(),
                preferred_window: request.preferred_window,
            })
        }
        _ => Err(AppError::validation_with_details(
            "mood, environment, weather and time zone are required",
            json!({ "missing": missing }),
        )),
    }
}

pub fn oracle_request_for(
    context: &SuggestionContext,
    snapshot: &DaySnapshot,
    avoid_titles: Vec<String>,
    retry_hint: Option<String>,
) -> OracleRequest {
    OracleRequest {
        tags: context.tags.clone(),
        mood: context.mood.clone(),
        environment: context.environment.clone(),
        weather: context.weather.clone(),
        calendar_conflicts: snapshot.oracle_conflicts(),
        time_window: context.preferred_window.as_str().to_string(),
        time_zone: context.time_zone.name().to_string(),
        avoid_titles: (!avoid_titles.is_empty()).then_some(avoid_titles),
        retry_hint,
    }
}

pub fn same_title(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Accumulator of the placement fold.
#[derive(Debug, Default)]
struct Placement {
    busy: Vec<BusyInterval>,
    scheduled: Vec<ScheduledSuggestion>,
    skipped: Vec<SkippedSuggestion>,
    valid: usize,
}

/// Asks the oracle for ideas and places them one after another into today.
pub struct SuggestionScheduler {
    deps: SchedulingDeps,
    finder: SlotFinder,
}

impl SuggestionScheduler {
    pub fn new(deps: SchedulingDeps, policy: SchedulingPolicy) -> Self {
        Self {
            deps,
            finder: SlotFinder::new(policy),
        }
    }

    pub async fn generate(&self, request: &SuggestionRequest) -> AppResult<SuggestionBatch> {
        let context = validate_context(request)?;
        let now = self.deps.clock.now();
        let zone_name = context.time_zone.name().to_string();

        if self
            .finder
            .band(context.preferred_window, &context.time_zone, now)
            .is_none()
        {
            info!(
                target: "app::suggest",
                window = context.preferred_window.as_str(),
                "preferred window already closed today"
            );
            return Ok(batch(Vec::new(), Vec::new(), BatchStatus::TooLateToday, zone_name));
        }

        let snapshot = DaySnapshot::collect(&self.deps, &context.time_zone, now, None).await?;
        let oracle_request =
            oracle_request_for(&context, &snapshot, snapshot.scheduled_titles.clone(), None);

        let candidates = self
            .deps
            .oracle
            .suggest(&oracle_request)
            .await
            .map_err(|err| {
                error!(target: "app::suggest", error = %err, "failed to generate suggestions");
                err
            })?;

        debug!(
            target: "app::suggest",
            candidates = candidates.len(),
            busy = snapshot.busy.len(),
            "placing oracle candidates"
        );

        let placement = self.place_all(candidates, &snapshot, &context, now);
        let status = batch_status(&placement);
        let mut scheduled = placement.scheduled;

        if request.auto_accept && !scheduled.is_empty() {
            scheduled = self.persist(scheduled)?;
        }

        info!(
            target: "app::suggest",
            scheduled = scheduled.len(),
            skipped = placement.skipped.len(),
            status = ?status,
            "suggestion batch finished"
        );

        Ok(batch(scheduled, placement.skipped, status, zone_name))
    }

    /// Like [`generate`](Self::generate), failing with `HttpTimeout` when the
    /// whole batch takes longer than `limit`.
    pub async fn generate_within(
        &self,
        request: &SuggestionRequest,
        limit: StdDuration,
    ) -> AppResult<SuggestionBatch> {
        tokio::time::timeout(limit, self.generate(request))
            .await
            .map_err(|_| {
                AppError::ai_with_details(
                    AiErrorCode::HttpTimeout,
                    "suggestion generation timed out",
                    None,
                    Some(json!({ "limitMs": limit.as_millis() as u64 })),
                )
            })?
    }

    /// Persists placements the user confirmed. Entries that already carry an
    /// event id are returned unchanged.
    pub fn accept(&self, suggestions: Vec<ScheduledSuggestion>) -> AppResult<Vec<ScheduledSuggestion>> {
        for suggestion in &suggestions {
            if suggestion.title.trim().is_empty() || suggestion.start >= suggestion.end {
                return Err(AppError::validation_with_details(
                    "accepted suggestion needs a title and a valid time range",
                    json!({ "title": suggestion.title }),
                ));
            }
        }
        self.persist(suggestions)
    }

    fn persist(&self, suggestions: Vec<ScheduledSuggestion>) -> AppResult<Vec<ScheduledSuggestion>> {
        let pending: Vec<_> = suggestions
            .iter()
            .filter(|suggestion| suggestion.event_id.is_none())
            .map(ScheduledSuggestion::to_new_event)
            .collect();
        let mut ids = self.deps.events.create_events(&pending)?.into_iter();

        Ok(suggestions
            .into_iter()
            .map(|mut suggestion| {
                if suggestion.event_id.is_none() {
                    suggestion.event_id = ids.next();
                }
                suggestion
            })
            .collect())
    }

    fn place_all(
        &self,
        candidates: Vec<RawCandidate>,
        snapshot: &DaySnapshot,
        context: &SuggestionContext,
        now: DateTime<Utc>,
    ) -> Placement {
        let initial = Placement {
            busy: snapshot.busy.clone(),
            ..Placement::default()
        };

        candidates.into_iter().fold(initial, |mut acc, raw| {
            let Some(candidate) = raw.validate() else {
                acc.skipped.push(SkippedSuggestion {
                    title: raw.display_title(),
                    reason: SkipReason::Unparsable,
                });
                return acc;
            };

            let duplicate = snapshot
                .scheduled_titles
                .iter()
                .chain(acc.scheduled.iter().map(|placed| &placed.title))
                .any(|title| same_title(title, &candidate.task));
            if duplicate {
                acc.skipped.push(SkippedSuggestion {
                    title: candidate.task,
                    reason: SkipReason::Duplicate,
                });
                return acc;
            }
            acc.valid += 1;

            let duration_minutes =
                infer_duration_minutes(&candidate.task, candidate.priority.as_task_priority());
            let request = SlotRequest {
                busy: &acc.busy,
                duration_minutes,
                time_zone: context.time_zone,
                preferred_window: context.preferred_window,
            };

            match self.finder.find_slot(&request, now) {
                PlacementResult::Placed { start, end } => {
                    if let Some(interval) = BusyInterval::new(start, end, SOURCE_SUGGESTION) {
                        acc.busy.push(interval);
                    }
                    acc.scheduled.push(ScheduledSuggestion {
                        title: candidate.task,
                        priority: candidate.priority,
                        reason: candidate.reason,
                        start,
                        end,
                        duration_minutes,
                        event_id: None,
                    });
                }
                PlacementResult::Failed { reason } => {
                    debug!(
                        target: "app::suggest",
                        title = %candidate.task,
                        reason = ?reason,
                        "candidate not placed"
                    );
                    acc.skipped.push(SkippedSuggestion {
                        title: candidate.task,
                        reason: reason.into(),
                    });
                }
            }
            acc
        })
    }
}

fn batch_status(placement: &Placement) -> BatchStatus {
    if placement.valid == 0 {
        BatchStatus::NothingSuggested
    } else if placement.scheduled.is_empty() {
        BatchStatus::NoAvailableSlot
    } else if placement.skipped.is_empty() {
        BatchStatus::Scheduled
    } else {
        BatchStatus::PartiallyScheduled
    }
}

fn batch(
    scheduled: Vec<ScheduledSuggestion>,
    skipped: Vec<SkippedSuggestion>,
    status: BatchStatus,
    time_zone: String,
) -> SuggestionBatch {
    SuggestionBatch {
        scheduled,
        skipped,
        status,
        message: status.message().to_string(),
        time_zone,
    }
}
