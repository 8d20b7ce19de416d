use tracing::{debug, info, warn};

use crate::error::{AppError, AppResult};
use crate::models::settings::SchedulingPolicy;
use crate::models::suggestion::{
    CandidateSuggestion, PlacementResult, RetryOutcome, RetryRequest, RetryUnavailableReason,
    ScheduledSuggestion,
};
use crate::services::schedule_utils::infer_duration_minutes;
use crate::services::slot_finder::{SlotFinder, SlotRequest};
use crate::services::suggestion_service::{
    oracle_request_for, same_title, validate_context, DaySnapshot, SchedulingDeps,
};
use crate::utils::similarity::is_too_similar;

pub fn retry_hint(rejected_title: &str) -> String {
    format!("User rejected \"{}\", suggest something different", rejected_title.trim())
}

/// Replaces a rejected suggestion with one that is clearly different.
///
/// The oracle is asked once. Candidates that resemble any rejected title
/// are discarded, and only the first survivor is placed, so repeated
/// rejections always make progress or end with an explicit outcome.
pub struct RetryResolver {
    deps: SchedulingDeps,
    finder: SlotFinder,
}

impl RetryResolver {
    pub fn new(deps: SchedulingDeps, policy: SchedulingPolicy) -> Self {
        Self {
            deps,
            finder: SlotFinder::new(policy),
        }
    }

    pub async fn retry(&self, request: &RetryRequest) -> AppResult<RetryOutcome> {
        let context = validate_context(&request.context)?;
        let now = self.deps.clock.now();
        let rejected = &request.rejected;

        if let Some(event_id) = rejected.event_id.as_deref() {
            match self.deps.events.get_event(event_id) {
                Ok(_) => {}
                Err(AppError::NotFound) => {
                    warn!(
                        target: "app::suggest",
                        event_id,
                        "rejected suggestion no longer exists"
                    );
                    return Ok(RetryOutcome::unavailable(
                        RetryUnavailableReason::NoDistinctSuggestion,
                    ));
                }
                Err(err) => return Err(err),
            }
        }

        if self
            .finder
            .band(context.preferred_window, &context.time_zone, now)
            .is_none()
        {
            return Ok(RetryOutcome::unavailable(
                RetryUnavailableReason::NoAvailableSlot,
            ));
        }

        let snapshot = DaySnapshot::collect(
            &self.deps,
            &context.time_zone,
            now,
            rejected.event_id.as_deref(),
        )
        .await?;

        let rejected_titles = rejected_titles(request);
        let mut avoid_titles = snapshot.scheduled_titles.clone();
        for title in &rejected_titles {
            if !avoid_titles.iter().any(|known| same_title(known, title)) {
                avoid_titles.push(title.clone());
            }
        }

        let oracle_request = oracle_request_for(
            &context,
            &snapshot,
            avoid_titles,
            Some(retry_hint(&rejected.title)),
        );
        let candidates = self.deps.oracle.suggest(&oracle_request).await?;

        let survivor = candidates
            .iter()
            .filter_map(|raw| raw.validate())
            .find(|candidate| is_distinct(candidate, &rejected_titles, &snapshot.scheduled_titles));

        let Some(candidate) = survivor else {
            info!(
                target: "app::suggest",
                rejected = %rejected.title,
                offered = candidates.len(),
                "no distinct replacement offered"
            );
            return Ok(RetryOutcome::unavailable(
                RetryUnavailableReason::NoDistinctSuggestion,
            ));
        };

        let duration_minutes =
            infer_duration_minutes(&candidate.task, candidate.priority.as_task_priority());
        let placement = self.finder.find_slot(
            &SlotRequest {
                busy: &snapshot.busy,
                duration_minutes,
                time_zone: context.time_zone,
                preferred_window: context.preferred_window,
            },
            now,
        );

        let PlacementResult::Placed { start, end } = placement else {
            debug!(
                target: "app::suggest",
                title = %candidate.task,
                "replacement could not be placed"
            );
            return Ok(RetryOutcome::unavailable(
                RetryUnavailableReason::NoAvailableSlot,
            ));
        };

        let mut suggestion = ScheduledSuggestion {
            title: candidate.task,
            priority: candidate.priority,
            reason: candidate.reason,
            start,
            end,
            duration_minutes,
            event_id: None,
        };

        if let Some(old_id) = rejected.event_id.as_deref() {
            let new_id = self
                .deps
                .events
                .replace_event(old_id, &suggestion.to_new_event())?;
            suggestion.event_id = Some(new_id);
        } else if request.context.auto_accept {
            let new_id = self.deps.events.create_event(&suggestion.to_new_event())?;
            suggestion.event_id = Some(new_id);
        }

        info!(
            target: "app::suggest",
            rejected = %rejected.title,
            replacement = %suggestion.title,
            "suggestion replaced"
        );

        Ok(RetryOutcome::Replaced {
            suggestion,
            replaced_title: rejected.title.clone(),
        })
    }
}

fn rejected_titles(request: &RetryRequest) -> Vec<String> {
    let mut titles = vec![request.rejected.title.trim().to_string()];
    for title in &request.previously_rejected {
        let title = title.trim();
        if !title.is_empty() && !titles.iter().any(|known| same_title(known, title)) {
            titles.push(title.to_string());
        }
    }
    titles
}

fn is_distinct(
    candidate: &CandidateSuggestion,
    rejected_titles: &[String],
    scheduled_titles: &[String],
) -> bool {
    let similar = rejected_titles
        .iter()
        .any(|rejected| is_too_similar(&candidate.task, rejected));
    let duplicate = scheduled_titles
        .iter()
        .any(|title| same_title(title, &candidate.task));
    !similar && !duplicate
}
