use serde::Deserialize;
use tracing::{debug, warn};

use crate::models::task::{TaskBankCreateInput, TaskBankItem, TaskDescriptor};
use crate::services::schedule_utils::resolve_timezone;

use super::{AppState, CommandError, CommandResult};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskParseRequest {
    pub text: String,
    #[serde(default)]
    pub time_zone: Option<String>,
}

/// Either raw text to parse or an already reviewed descriptor.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskBankAddRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub descriptor: Option<TaskDescriptor>,
    #[serde(default)]
    pub time_zone: Option<String>,
}

fn parse_with_state(app_state: &AppState, text: &str, time_zone: Option<&str>) -> TaskDescriptor {
    let tz = resolve_timezone(time_zone.unwrap_or("UTC"));
    let now = app_state.clock().now().with_timezone(&tz);
    app_state.parser().parse(text, now)
}

pub async fn tasks_parse_text(
    app_state: &AppState,
    request: TaskParseRequest,
) -> CommandResult<TaskDescriptor> {
    if request.text.trim().is_empty() {
        return Err(CommandError::new(
            "VALIDATION_ERROR",
            "text to parse must not be empty",
            None,
        ));
    }

    let descriptor = parse_with_state(app_state, &request.text, request.time_zone.as_deref());
    debug!(
        target: "app::command",
        scheduled = descriptor.scheduled,
        priority = descriptor.priority.as_str(),
        "tasks_parse_text completed"
    );
    Ok(descriptor)
}

pub async fn task_bank_add(
    app_state: &AppState,
    request: TaskBankAddRequest,
) -> CommandResult<TaskBankItem> {
    let descriptor = match (request.descriptor, request.text.as_deref()) {
        (Some(descriptor), _) => descriptor,
        (None, Some(text)) if !text.trim().is_empty() => {
            parse_with_state(app_state, text, request.time_zone.as_deref())
        }
        _ => {
            return Err(CommandError::new(
                "VALIDATION_ERROR",
                "either text or a parsed task is required",
                None,
            ))
        }
    };

    app_state
        .task_bank()
        .add(TaskBankCreateInput::from(&descriptor))
        .map_err(|error| {
            warn!(target: "app::command", error = %error, "task_bank_add failed");
            CommandError::from(error)
        })
}

pub async fn task_bank_list(app_state: &AppState) -> CommandResult<Vec<TaskBankItem>> {
    app_state
        .task_bank()
        .list_unscheduled()
        .map_err(CommandError::from)
}
