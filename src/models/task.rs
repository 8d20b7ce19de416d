use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
}

impl TaskPriority {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(TaskPriority::Low),
            "medium" => Some(TaskPriority::Medium),
            "high" => Some(TaskPriority::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskCategory {
    Work,
    Personal,
    Health,
    Social,
    Creative,
    Learning,
    Finance,
    Travel,
}

impl TaskCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskCategory::Work => "work",
            TaskCategory::Personal => "personal",
            TaskCategory::Health => "health",
            TaskCategory::Social => "social",
            TaskCategory::Creative => "creative",
            TaskCategory::Learning => "learning",
            TaskCategory::Finance => "finance",
            TaskCategory::Travel => "travel",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurrenceKind {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecurrence {
    #[serde(rename = "type")]
    pub kind: RecurrenceKind,
    pub interval: u32,
}

/// Structured intent extracted from one line of free text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDescriptor {
    pub title: String,
    pub priority: TaskPriority,
    pub scheduled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<FixedOffset>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<TaskCategory>,
    /// Minutes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurring: Option<TaskRecurrence>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attendees: Vec<String>,
    pub original_text: String,
}

/// A task waiting in the user's bank. Unscheduled items still block time
/// through an estimated placement when conflicts are built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskBankItem {
    pub id: String,
    pub title: String,
    pub priority: TaskPriority,
    #[serde(default)]
    pub category: Option<TaskCategory>,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
    pub scheduled: bool,
    #[serde(default)]
    pub scheduled_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub scheduled_end: Option<DateTime<Utc>>,
    #[serde(default)]
    pub original_text: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskBankCreateInput {
    pub title: String,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub category: Option<TaskCategory>,
    #[serde(default)]
    pub duration_minutes: Option<i64>,
    /// Confirmed start; the item is stored as scheduled when present.
    #[serde(default)]
    pub scheduled_start: Option<DateTime<Utc>>,
    #[serde(default)]
    pub original_text: Option<String>,
}

impl From<&TaskDescriptor> for TaskBankCreateInput {
    fn from(descriptor: &TaskDescriptor) -> Self {
        Self {
            title: descriptor.title.clone(),
            priority: descriptor.priority,
            category: descriptor.category,
            duration_minutes: descriptor.duration,
            scheduled_start: descriptor
                .timestamp
                .filter(|_| descriptor.scheduled)
                .map(|timestamp| timestamp.with_timezone(&Utc)),
            original_text: Some(descriptor.original_text.clone()),
        }
    }
}
