use std::collections::HashMap;
use std::sync::RwLock;

use serde_json::json;
use tracing::{info, warn};

use crate::db::repositories::settings_repository::SettingsRepository;
use crate::db::DbPool;
use crate::error::{AppError, AppResult};
use crate::models::settings::{SchedulingPolicy, SchedulingPolicyUpdate};

const KEY_PREFIX: &str = "scheduling.";
const KEY_BUFFER: &str = "scheduling.buffer_minutes";
const KEY_GRANULARITY: &str = "scheduling.slot_granularity_minutes";
const KEY_LEAD: &str = "scheduling.lead_minutes";
const KEY_LUNCH_START: &str = "scheduling.lunch_start_minute";
const KEY_LUNCH_END: &str = "scheduling.lunch_end_minute";

const MAX_BUFFER_MINUTES: i64 = 240;
const MAX_GRANULARITY_MINUTES: i64 = 120;
const MAX_LEAD_MINUTES: i64 = 12 * 60;
const MINUTES_PER_DAY: u32 = 24 * 60;

/// Scheduling policy persisted in `app_settings`, cached after first read.
pub struct SettingsService {
    db: DbPool,
    cache: RwLock<Option<SchedulingPolicy>>,
}

impl SettingsService {
    pub fn new(db: DbPool) -> Self {
        Self {
            db,
            cache: RwLock::new(None),
        }
    }

    pub fn scheduling_policy(&self) -> AppResult<SchedulingPolicy> {
        if let Ok(guard) = self.cache.read() {
            if let Some(policy) = guard.as_ref() {
                return Ok(*policy);
            }
        }

        let policy = self.load_policy()?;
        if let Ok(mut guard) = self.cache.write() {
            *guard = Some(policy);
        }
        Ok(policy)
    }

    pub fn update_scheduling_policy(
        &self,
        update: SchedulingPolicyUpdate,
    ) -> AppResult<SchedulingPolicy> {
        let mut policy = self.scheduling_policy()?;

        if let Some(value) = update.buffer_minutes {
            policy.buffer_minutes = value;
        }
        if let Some(value) = update.slot_granularity_minutes {
            policy.slot_granularity_minutes = value;
        }
        if let Some(value) = update.lead_minutes {
            policy.lead_minutes = value;
        }
        if let Some(value) = update.lunch_start_minute {
            policy.lunch_start_minute = value;
        }
        if let Some(value) = update.lunch_end_minute {
            policy.lunch_end_minute = value;
        }

        validate_policy(&policy)?;

        self.db.with_transaction(|tx| {
            SettingsRepository::upsert(tx, KEY_BUFFER, &policy.buffer_minutes.to_string())?;
            SettingsRepository::upsert(
                tx,
                KEY_GRANULARITY,
                &policy.slot_granularity_minutes.to_string(),
            )?;
            SettingsRepository::upsert(tx, KEY_LEAD, &policy.lead_minutes.to_string())?;
            SettingsRepository::upsert(
                tx,
                KEY_LUNCH_START,
                &policy.lunch_start_minute.to_string(),
            )?;
            SettingsRepository::upsert(tx, KEY_LUNCH_END, &policy.lunch_end_minute.to_string())?;
            Ok(())
        })?;

        if let Ok(mut guard) = self.cache.write() {
            *guard = Some(policy);
        }

        info!(
            target: "app::settings",
            buffer = policy.buffer_minutes,
            granularity = policy.slot_granularity_minutes,
            lead = policy.lead_minutes,
            "scheduling policy updated"
        );

        Ok(policy)
    }

    fn load_policy(&self) -> AppResult<SchedulingPolicy> {
        let rows = self
            .db
            .with_connection(|conn| SettingsRepository::list_prefixed(conn, KEY_PREFIX))?;
        let values: HashMap<String, String> =
            rows.into_iter().map(|row| (row.key, row.value)).collect();

        let defaults = SchedulingPolicy::default();
        let policy = SchedulingPolicy {
            buffer_minutes: read_value(&values, KEY_BUFFER, defaults.buffer_minutes),
            slot_granularity_minutes: read_value(
                &values,
                KEY_GRANULARITY,
                defaults.slot_granularity_minutes,
            ),
            lead_minutes: read_value(&values, KEY_LEAD, defaults.lead_minutes),
            lunch_start_minute: read_value(&values, KEY_LUNCH_START, defaults.lunch_start_minute),
            lunch_end_minute: read_value(&values, KEY_LUNCH_END, defaults.lunch_end_minute),
        };

        if let Err(err) = validate_policy(&policy) {
            warn!(
                target: "app::settings",
                error = %err,
                "stored scheduling policy is invalid, using defaults"
            );
            return Ok(defaults);
        }

        Ok(policy)
    }
}

fn read_value<T>(values: &HashMap<String, String>, key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    match values.get(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(target: "app::settings", key, value = %raw, "ignoring unparsable setting");
            default
        }),
        None => default,
    }
}

pub fn validate_policy(policy: &SchedulingPolicy) -> AppResult<()> {
    if !(0..=MAX_BUFFER_MINUTES).contains(&policy.buffer_minutes) {
        return Err(AppError::validation_with_details(
            "buffer must be between 0 and 240 minutes",
            json!({"bufferMinutes": policy.buffer_minutes}),
        ));
    }
    if !(1..=MAX_GRANULARITY_MINUTES).contains(&policy.slot_granularity_minutes) {
        return Err(AppError::validation_with_details(
            "slot granularity must be between 1 and 120 minutes",
            json!({"slotGranularityMinutes": policy.slot_granularity_minutes}),
        ));
    }
    if !(0..=MAX_LEAD_MINUTES).contains(&policy.lead_minutes) {
        return Err(AppError::validation_with_details(
            "lead time must be between 0 and 720 minutes",
            json!({"leadMinutes": policy.lead_minutes}),
        ));
    }
    if policy.lunch_start_minute > policy.lunch_end_minute
        || policy.lunch_end_minute > MINUTES_PER_DAY
    {
        return Err(AppError::validation_with_details(
            "lunch window must start before it ends and stay within the day",
            json!({
                "lunchStartMinute": policy.lunch_start_minute,
                "lunchEndMinute": policy.lunch_end_minute
            }),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_is_valid() {
        assert!(validate_policy(&SchedulingPolicy::default()).is_ok());
    }

    #[test]
    fn empty_lunch_window_is_allowed() {
        let policy = SchedulingPolicy {
            lunch_start_minute: 0,
            lunch_end_minute: 0,
            ..SchedulingPolicy::default()
        };
        assert!(validate_policy(&policy).is_ok());
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        let cases = [
            SchedulingPolicy {
                buffer_minutes: -5,
                ..SchedulingPolicy::default()
            },
            SchedulingPolicy {
                slot_granularity_minutes: 0,
                ..SchedulingPolicy::default()
            },
            SchedulingPolicy {
                lunch_start_minute: 14 * 60,
                lunch_end_minute: 13 * 60,
                ..SchedulingPolicy::default()
            },
        ];
        for policy in cases {
            assert!(validate_policy(&policy).unwrap_err().is_validation());
        }
    }
}
