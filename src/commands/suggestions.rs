use std::time::Duration as StdDuration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::models::suggestion::{
    RetryOutcome, RetryRequest, ScheduledSuggestion, SuggestionBatch, SuggestionRequest,
};

use super::{AppState, CommandError, CommandResult};

/// Upper bound for one batch, oracle round trip included.
const GENERATE_LIMIT: StdDuration = StdDuration::from_secs(45);

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptSuggestionsRequest {
    pub suggestions: Vec<ScheduledSuggestion>,
}

pub async fn suggestions_generate(
    app_state: &AppState,
    request: SuggestionRequest,
) -> CommandResult<SuggestionBatch> {
    debug!(
        target: "app::command",
        window = request.preferred_window.as_str(),
        auto_accept = request.auto_accept,
        "suggestions_generate invoked"
    );

    let scheduler = app_state.scheduler()?;
    match scheduler.generate_within(&request, GENERATE_LIMIT).await {
        Ok(batch) => {
            debug!(
                target: "app::command",
                scheduled = batch.scheduled.len(),
                skipped = batch.skipped.len(),
                "suggestions_generate completed"
            );
            Ok(batch)
        }
        Err(error) => {
            let correlation_id = error.ai_correlation_id().unwrap_or("-");
            warn!(
                target: "app::command",
                error = %error,
                correlation_id = %correlation_id,
                "suggestions_generate failed"
            );
            Err(CommandError::from(error))
        }
    }
}

pub async fn suggestions_accept(
    app_state: &AppState,
    request: AcceptSuggestionsRequest,
) -> CommandResult<Vec<ScheduledSuggestion>> {
    let scheduler = app_state.scheduler()?;
    scheduler.accept(request.suggestions).map_err(|error| {
        warn!(target: "app::command", error = %error, "suggestions_accept failed");
        CommandError::from(error)
    })
}

pub async fn suggestions_retry(
    app_state: &AppState,
    request: RetryRequest,
) -> CommandResult<RetryOutcome> {
    debug!(
        target: "app::command",
        rejected = %request.rejected.title,
        previously_rejected = request.previously_rejected.len(),
        "suggestions_retry invoked"
    );

    let resolver = app_state.retry_resolver()?;
    resolver.retry(&request).await.map_err(|error| {
        warn!(target: "app::command", error = %error, "suggestions_retry failed");
        CommandError::from(error)
    })
}
