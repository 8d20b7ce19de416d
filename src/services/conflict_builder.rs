use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use tracing::{debug, warn};

use crate::models::event::{
    BusyInterval, CalendarInterval, SOURCE_CALENDAR, SOURCE_STORED, SOURCE_TASK_BANK,
};
use crate::models::task::{TaskBankItem, TaskPriority};
use crate::services::schedule_utils::{infer_duration_minutes, local_date, local_minute_of_day};

/// Everything that can occupy the user's time today.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictSources<'a> {
    pub synced: &'a [CalendarInterval],
    pub stored: &'a [CalendarInterval],
    pub unscheduled_tasks: &'a [TaskBankItem],
}

/// Local minute of day at which an unscheduled task is assumed to run.
pub fn task_anchor_minute(priority: TaskPriority) -> u32 {
    match priority {
        TaskPriority::High => 8 * 60,
        TaskPriority::Medium => 13 * 60,
        TaskPriority::Low => 16 * 60,
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictSetBuilder;

impl ConflictSetBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Merge all sources into one busy set ordered by start.
    ///
    /// Synced entries that already ended are irrelevant and dropped; stored
    /// entries pass through as given. Task-bank items without a confirmed
    /// time get an estimated interval today so they still block placement.
    pub fn build(
        &self,
        sources: &ConflictSources<'_>,
        now: DateTime<Utc>,
        time_zone: &Tz,
    ) -> Vec<BusyInterval> {
        let mut busy: Vec<BusyInterval> = Vec::with_capacity(
            sources.synced.len() + sources.stored.len() + sources.unscheduled_tasks.len(),
        );

        busy.extend(
            sources
                .synced
                .iter()
                .filter(|interval| interval.end > now)
                .filter_map(|interval| to_busy(interval, SOURCE_CALENDAR)),
        );
        busy.extend(
            sources
                .stored
                .iter()
                .filter_map(|interval| to_busy(interval, SOURCE_STORED)),
        );
        busy.extend(
            sources
                .unscheduled_tasks
                .iter()
                .filter_map(|item| estimate_task_interval(item, now, time_zone)),
        );

        busy.sort_by_key(|interval| interval.start);

        debug!(
            target: "app::suggest",
            synced = sources.synced.len(),
            stored = sources.stored.len(),
            tasks = sources.unscheduled_tasks.len(),
            merged = busy.len(),
            "conflict set built"
        );

        busy
    }
}

fn to_busy(interval: &CalendarInterval, label: &str) -> Option<BusyInterval> {
    let busy = BusyInterval::new(interval.start, interval.end, label);
    if busy.is_none() {
        warn!(
            target: "app::suggest",
            source = label,
            start = %interval.start,
            end = %interval.end,
            "dropping malformed busy interval"
        );
    }
    busy
}

/// Interval a task-bank item occupies today. Items that carry a confirmed
/// time use it; the rest are anchored by priority.
pub fn estimate_task_interval(
    item: &TaskBankItem,
    now: DateTime<Utc>,
    time_zone: &Tz,
) -> Option<BusyInterval> {
    if let (true, Some(start), Some(end)) = (item.scheduled, item.scheduled_start, item.scheduled_end)
    {
        return BusyInterval::new(start, end, SOURCE_TASK_BANK);
    }

    let minutes = item
        .duration_minutes
        .filter(|minutes| *minutes > 0)
        .unwrap_or_else(|| infer_duration_minutes(&item.title, item.priority));

    let date = local_date(now, time_zone);
    let start = local_minute_of_day(time_zone, date, task_anchor_minute(item.priority));
    let Some(end) = Duration::try_minutes(minutes)
        .and_then(|length| start.checked_add_signed(length))
    else {
        warn!(
            target: "app::suggest",
            task_id = %item.id,
            duration_minutes = minutes,
            "dropping task with out-of-range duration"
        );
        return None;
    };
    BusyInterval::new(start, end, SOURCE_TASK_BANK)
}
