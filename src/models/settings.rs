use serde::{Deserialize, Serialize};

pub const DEFAULT_BUFFER_MINUTES: i64 = 30;
pub const DEFAULT_SLOT_GRANULARITY_MINUTES: i64 = 15;
pub const DEFAULT_LEAD_MINUTES: i64 = 30;
pub const DEFAULT_LUNCH_START_MINUTE: u32 = 12 * 60;
pub const DEFAULT_LUNCH_END_MINUTE: u32 = 13 * 60;

/// Placement constants. Minutes are counted from local midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingPolicy {
    pub buffer_minutes: i64,
    pub slot_granularity_minutes: i64,
    pub lead_minutes: i64,
    pub lunch_start_minute: u32,
    pub lunch_end_minute: u32,
}

impl Default for SchedulingPolicy {
    fn default() -> Self {
        Self {
            buffer_minutes: DEFAULT_BUFFER_MINUTES,
            slot_granularity_minutes: DEFAULT_SLOT_GRANULARITY_MINUTES,
            lead_minutes: DEFAULT_LEAD_MINUTES,
            lunch_start_minute: DEFAULT_LUNCH_START_MINUTE,
            lunch_end_minute: DEFAULT_LUNCH_END_MINUTE,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingPolicyUpdate {
    #[serde(default)]
    pub buffer_minutes: Option<i64>,
    #[serde(default)]
    pub slot_granularity_minutes: Option<i64>,
    #[serde(default)]
    pub lead_minutes: Option<i64>,
    #[serde(default)]
    pub lunch_start_minute: Option<u32>,
    #[serde(default)]
    pub lunch_end_minute: Option<u32>,
}
