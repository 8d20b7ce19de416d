use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::models::event::BusyInterval;
use crate::models::suggestion::RawCandidate;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OracleConflict {
    pub start: String,
    pub end: String,
}

impl From<&BusyInterval> for OracleConflict {
    fn from(interval: &BusyInterval) -> Self {
        Self {
            start: interval.start.to_rfc3339(),
            end: interval.end.to_rfc3339(),
        }
    }
}

/// Context handed to the recommendation oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct OracleRequest {
    pub tags: Vec<String>,
    pub mood: String,
    pub environment: String,
    pub weather: String,
    pub calendar_conflicts: Vec<OracleConflict>,
    pub time_window: String,
    pub time_zone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avoid_titles: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_hint: Option<String>,
}

/// Black-box recommendation source. Implementations make at most one
/// outbound call per invocation.
#[async_trait::async_trait]
pub trait SuggestionOracle: Send + Sync {
    async fn suggest(&self, request: &OracleRequest) -> AppResult<Vec<RawCandidate>>;
}
