use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::models::event::{EventSource, NewEvent};
use crate::models::task::TaskPriority;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SuggestionPriority {
    High,
    Medium,
    Low,
}

impl SuggestionPriority {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "high" => Some(SuggestionPriority::High),
            "medium" => Some(SuggestionPriority::Medium),
            "low" => Some(SuggestionPriority::Low),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SuggestionPriority::High => "High",
            SuggestionPriority::Medium => "Medium",
            SuggestionPriority::Low => "Low",
        }
    }

    pub fn as_task_priority(self) -> TaskPriority {
        match self {
            SuggestionPriority::High => TaskPriority::High,
            SuggestionPriority::Medium => TaskPriority::Medium,
            SuggestionPriority::Low => TaskPriority::Low,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PreferredWindow {
    Morning,
    Afternoon,
    Evening,
    #[default]
    Any,
}

impl PreferredWindow {
    /// Local hour band `[start, end)` eligible for placement.
    pub fn hours(self) -> (u32, u32) {
        match self {
            PreferredWindow::Morning => (8, 12),
            PreferredWindow::Afternoon => (12, 17),
            PreferredWindow::Evening => (17, 21),
            PreferredWindow::Any => (8, 21),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PreferredWindow::Morning => "morning",
            PreferredWindow::Afternoon => "afternoon",
            PreferredWindow::Evening => "evening",
            PreferredWindow::Any => "any",
        }
    }
}

/// Oracle output before validation. Every field is optional so one bad
/// entry never fails decoding of the whole list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RawCandidate {
    #[serde(alias = "title")]
    pub task: Option<String>,
    pub priority: Option<String>,
    pub reason: Option<String>,
}

impl RawCandidate {
    pub fn new(task: &str, priority: &str, reason: &str) -> Self {
        Self {
            task: Some(task.to_string()),
            priority: Some(priority.to_string()),
            reason: Some(reason.to_string()),
        }
    }

    pub fn display_title(&self) -> String {
        self.task
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or("(untitled suggestion)")
            .to_string()
    }

    pub fn validate(&self) -> Option<CandidateSuggestion> {
        let task = non_empty(self.task.as_deref())?;
        let priority = SuggestionPriority::parse(non_empty(self.priority.as_deref())?)?;
        let reason = non_empty(self.reason.as_deref())?;
        Some(CandidateSuggestion {
            task: task.to_string(),
            priority,
            reason: reason.to_string(),
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateSuggestion {
    pub task: String,
    pub priority: SuggestionPriority,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledSuggestion {
    pub title: String,
    pub priority: SuggestionPriority,
    pub reason: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_minutes: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
}

impl ScheduledSuggestion {
    pub fn to_new_event(&self) -> NewEvent {
        NewEvent {
            title: self.title.clone(),
            start: self.start,
            end: self.end,
            source: EventSource::Suggestion,
            color: Some(EventSource::Suggestion.default_color().to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SkipReason {
    NoSlotAvailable,
    OutsideWindow,
    Unparsable,
    Duplicate,
}

impl SkipReason {
    pub fn describe(self) -> &'static str {
        match self {
            SkipReason::NoSlotAvailable => "no free slot left in the preferred window",
            SkipReason::OutsideWindow => "the preferred window has no room left today",
            SkipReason::Unparsable => "suggestion was missing a task, priority or reason",
            SkipReason::Duplicate => "already on today's calendar",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedSuggestion {
    pub title: String,
    pub reason: SkipReason,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PlacementFailure {
    NoSlot,
    OutsideWindow,
    Unparsable,
}

impl From<PlacementFailure> for SkipReason {
    fn from(failure: PlacementFailure) -> Self {
        match failure {
            PlacementFailure::NoSlot => SkipReason::NoSlotAvailable,
            PlacementFailure::OutsideWindow => SkipReason::OutsideWindow,
            PlacementFailure::Unparsable => SkipReason::Unparsable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "result")]
pub enum PlacementResult {
    Placed {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    Failed {
        reason: PlacementFailure,
    },
}

impl PlacementResult {
    pub fn slot(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        match self {
            PlacementResult::Placed { start, end } => Some((*start, *end)),
            PlacementResult::Failed { .. } => None,
        }
    }
}

/// Caller-supplied context for a suggestion batch. Required fields are
/// optional here so that missing values surface as validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionRequest {
    #[serde(default)]
    pub mood: Option<String>,
    #[serde(default)]
    pub environment: Option<String>,
    #[serde(default)]
    pub weather: Option<String>,
    #[serde(default)]
    pub time_zone: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub preferred_window: PreferredWindow,
    #[serde(default)]
    pub auto_accept: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SuggestionContext {
    pub mood: String,
    pub environment: String,
    pub weather: String,
    pub time_zone: Tz,
    pub tags: Vec<String>,
    pub preferred_window: PreferredWindow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BatchStatus {
    Scheduled,
    PartiallyScheduled,
    TooLateToday,
    NoAvailableSlot,
    NothingSuggested,
}

impl BatchStatus {
    pub fn message(self) -> &'static str {
        match self {
            BatchStatus::Scheduled => "suggestions scheduled",
            BatchStatus::PartiallyScheduled => "some suggestions were skipped",
            BatchStatus::TooLateToday => "it's too late to optimize today",
            BatchStatus::NoAvailableSlot => "no free time is left in your preferred window today",
            BatchStatus::NothingSuggested => "no suggestions are available for this context right now",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuggestionBatch {
    pub scheduled: Vec<ScheduledSuggestion>,
    pub skipped: Vec<SkippedSuggestion>,
    pub status: BatchStatus,
    pub message: String,
    pub time_zone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryRequest {
    pub rejected: ScheduledSuggestion,
    #[serde(flatten)]
    pub context: SuggestionRequest,
    #[serde(default)]
    pub previously_rejected: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RetryUnavailableReason {
    NoDistinctSuggestion,
    NoAvailableSlot,
}

impl RetryUnavailableReason {
    pub fn message(self) -> &'static str {
        match self {
            RetryUnavailableReason::NoDistinctSuggestion => {
                "no sufficiently different suggestion is available"
            }
            RetryUnavailableReason::NoAvailableSlot => {
                "no available time slot for a replacement today"
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum RetryOutcome {
    #[serde(rename_all = "camelCase")]
    Replaced {
        suggestion: ScheduledSuggestion,
        replaced_title: String,
    },
    #[serde(rename_all = "camelCase")]
    Unavailable {
        reason: RetryUnavailableReason,
        message: String,
    },
}

impl RetryOutcome {
    pub fn unavailable(reason: RetryUnavailableReason) -> Self {
        RetryOutcome::Unavailable {
            reason,
            message: reason.message().to_string(),
        }
    }

    pub fn replacement(&self) -> Option<&ScheduledSuggestion> {
        match self {
            RetryOutcome::Replaced { suggestion, .. } => Some(suggestion),
            RetryOutcome::Unavailable { .. } => None,
        }
    }
}
