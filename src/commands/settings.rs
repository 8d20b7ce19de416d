use crate::models::settings::{SchedulingPolicy, SchedulingPolicyUpdate};

use super::{AppState, CommandError, CommandResult};

pub async fn settings_get(app_state: &AppState) -> CommandResult<SchedulingPolicy> {
    app_state
        .settings()
        .scheduling_policy()
        .map_err(CommandError::from)
}

pub async fn settings_update(
    app_state: &AppState,
    payload: SchedulingPolicyUpdate,
) -> CommandResult<SchedulingPolicy> {
    app_state
        .settings()
        .update_scheduling_policy(payload)
        .map_err(CommandError::from)
}
