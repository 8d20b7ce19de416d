pub mod settings;
pub mod suggestions;
pub mod task;

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map as JsonMap, Value as JsonValue};
use tracing::{error, warn};

use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::oracle::SuggestionOracle;
use crate::services::calendar_provider::{CalendarProvider, NoCalendar};
use crate::services::event_store::{
    EventStore, SqliteEventStore, SqliteTaskBankStore, TaskBankStore,
};
use crate::services::oracle_service::{oracle_from_config, OracleConfig};
use crate::services::retry_service::RetryResolver;
use crate::services::settings_service::SettingsService;
use crate::services::suggestion_service::{SchedulingDeps, SuggestionScheduler};
use crate::services::task_parser::TextIntentParser;
use crate::utils::clock::{Clock, SystemClock};

/// Everything a command handler needs, cheap to clone.
#[derive(Clone)]
pub struct AppState {
    db_pool: DbPool,
    parser: Arc<TextIntentParser>,
    settings_service: Arc<SettingsService>,
    deps: SchedulingDeps,
}

impl AppState {
    /// Production wiring: SQLite stores, oracle from the environment, no
    /// connected calendar, wall clock.
    pub fn new(db_pool: DbPool) -> AppResult<Self> {
        let oracle = oracle_from_config(&OracleConfig::from_env())?;
        Ok(Self::with_collaborators(
            db_pool,
            oracle,
            Arc::new(NoCalendar),
            Arc::new(SystemClock),
        ))
    }

    pub fn with_collaborators(
        db_pool: DbPool,
        oracle: Arc<dyn SuggestionOracle>,
        calendar: Arc<dyn CalendarProvider>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let events: Arc<dyn EventStore> = Arc::new(SqliteEventStore::new(db_pool.clone()));
        let tasks: Arc<dyn TaskBankStore> = Arc::new(SqliteTaskBankStore::new(db_pool.clone()));
        let settings_service = Arc::new(SettingsService::new(db_pool.clone()));

        Self {
            db_pool,
            parser: Arc::new(TextIntentParser::new()),
            settings_service,
            deps: SchedulingDeps {
                oracle,
                events,
                tasks,
                calendar,
                clock,
            },
        }
    }

    pub fn db(&self) -> DbPool {
        self.db_pool.clone()
    }

    pub fn parser(&self) -> Arc<TextIntentParser> {
        Arc::clone(&self.parser)
    }

    pub fn settings(&self) -> Arc<SettingsService> {
        Arc::clone(&self.settings_service)
    }

    pub fn events(&self) -> Arc<dyn EventStore> {
        Arc::clone(&self.deps.events)
    }

    pub fn task_bank(&self) -> Arc<dyn TaskBankStore> {
        Arc::clone(&self.deps.tasks)
    }

    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.deps.clock)
    }

    /// Scheduler using the currently persisted policy.
    pub fn scheduler(&self) -> AppResult<SuggestionScheduler> {
        let policy = self.settings_service.scheduling_policy()?;
        Ok(SuggestionScheduler::new(self.deps.clone(), policy))
    }

    pub fn retry_resolver(&self) -> AppResult<RetryResolver> {
        let policy = self.settings_service.scheduling_policy()?;
        Ok(RetryResolver::new(self.deps.clone(), policy))
    }
}

pub type CommandResult<T> = Result<T, CommandError>;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<JsonValue>,
}

impl CommandError {
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        details: Option<JsonValue>,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details,
        }
    }
}

impl From<AppError> for CommandError {
    fn from(error: AppError) -> Self {
        match error {
            AppError::Validation {
                message, details, ..
            } => CommandError::new("VALIDATION_ERROR", message, details),
            AppError::NotFound => {
                CommandError::new("NOT_FOUND", "the requested record does not exist", None)
            }
            AppError::Conflict { message } => CommandError::new("CONFLICT", message, None),
            AppError::Ai {
                code,
                message,
                correlation_id,
                details,
            } => {
                let mut merged = JsonMap::new();
                if let Some(existing) = details {
                    match existing {
                        JsonValue::Object(map) => merged.extend(map),
                        value => {
                            merged.insert("info".to_string(), value);
                        }
                    }
                }
                if let Some(id) = correlation_id {
                    merged.insert("correlationId".to_string(), JsonValue::String(id));
                }
                let detail_value = (!merged.is_empty()).then_some(JsonValue::Object(merged));
                warn!(target: "app::command", code = %code, %message, "oracle error in command");
                CommandError::new(
                    code.as_str(),
                    format!("failed to generate suggestions: {message}"),
                    detail_value,
                )
            }
            AppError::Database { message } => {
                error!(target: "app::command", %message, "database error in command");
                CommandError::new("UNKNOWN", message, None)
            }
            AppError::Serialization(error) => {
                error!(target: "app::command", error = %error, "serialization error in command");
                CommandError::new("UNKNOWN", "serialization failed", None)
            }
            AppError::Io(error) => {
                error!(target: "app::command", error = %error, "io error in command");
                CommandError::new("UNKNOWN", "file system access failed", None)
            }
            AppError::Other(message) => {
                error!(target: "app::command", %message, "unexpected error in command");
                CommandError::new("UNKNOWN", message, None)
            }
        }
    }
}
