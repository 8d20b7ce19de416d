use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use tracing::debug;

use crate::models::event::BusyInterval;
use crate::models::settings::SchedulingPolicy;
use crate::models::suggestion::{PlacementFailure, PlacementResult, PreferredWindow};
use crate::services::schedule_utils::{
    local_date, local_minute_of_day, overlaps, truncate_to_minute,
};

/// Inputs for a single placement.
#[derive(Debug, Clone, Copy)]
pub struct SlotRequest<'a> {
    pub busy: &'a [BusyInterval],
    pub duration_minutes: i64,
    pub time_zone: Tz,
    pub preferred_window: PreferredWindow,
}

/// The local band eligible for placement today, already clipped to the
/// search floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchBand {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl SearchBand {
    pub fn minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

/// Earliest-fit slot search over a fixed time-of-day band.
///
/// Busy intervals are widened by the policy buffer on both sides and the
/// lunch window is always excluded. Candidates are scanned on the
/// granularity grid anchored at the band start, so identical inputs always
/// yield the identical slot.
#[derive(Debug, Clone, Copy, Default)]
pub struct SlotFinder {
    policy: SchedulingPolicy,
}

impl SlotFinder {
    pub fn new(policy: SchedulingPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &SchedulingPolicy {
        &self.policy
    }

    /// Earliest instant a placement may start.
    pub fn floor(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        truncate_to_minute(now + Duration::minutes(self.policy.lead_minutes.max(0)))
    }

    /// Today's band for `window`, or `None` once the floor has passed its end.
    pub fn band(
        &self,
        window: PreferredWindow,
        time_zone: &Tz,
        now: DateTime<Utc>,
    ) -> Option<SearchBand> {
        let (band_start, band_end) = raw_band(window, time_zone, now);
        let start = band_start.max(self.floor(now));
        if start >= band_end {
            return None;
        }
        Some(SearchBand {
            start,
            end: band_end,
        })
    }

    pub fn find_slot(&self, request: &SlotRequest<'_>, now: DateTime<Utc>) -> PlacementResult {
        if request.duration_minutes <= 0 {
            return PlacementResult::Failed {
                reason: PlacementFailure::Unparsable,
            };
        }

        let tz = request.time_zone;
        let date = local_date(now, &tz);
        let (band_start, band_end) = raw_band(request.preferred_window, &tz, now);
        let floor = self.floor(now);
        let duration = Duration::minutes(request.duration_minutes);

        let lower = band_start.max(floor);
        if lower + duration > band_end {
            debug!(
                target: "app::suggest",
                window = request.preferred_window.as_str(),
                duration = request.duration_minutes,
                "preferred window has no room left"
            );
            return PlacementResult::Failed {
                reason: PlacementFailure::OutsideWindow,
            };
        }

        let lunch_start = local_minute_of_day(&tz, date, self.policy.lunch_start_minute);
        let lunch_end = local_minute_of_day(&tz, date, self.policy.lunch_end_minute);
        let padded: Vec<(DateTime<Utc>, DateTime<Utc>)> = request
            .busy
            .iter()
            .map(|interval| interval.padded(self.policy.buffer_minutes))
            .collect();

        let step = self.policy.slot_granularity_minutes.max(1);
        let mut candidate = align_to_grid(band_start, lower, step);

        while candidate + duration <= band_end {
            let end = candidate + duration;
            let hits_busy = padded
                .iter()
                .any(|(busy_start, busy_end)| conflicts_with_padded(candidate, end, *busy_start, *busy_end));
            let hits_lunch = lunch_start < lunch_end && overlaps(candidate, end, lunch_start, lunch_end);

            if !hits_busy && !hits_lunch {
                return PlacementResult::Placed {
                    start: candidate,
                    end,
                };
            }
            candidate += Duration::minutes(step);
        }

        PlacementResult::Failed {
            reason: PlacementFailure::NoSlot,
        }
    }
}

fn raw_band(
    window: PreferredWindow,
    time_zone: &Tz,
    now: DateTime<Utc>,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let date = local_date(now, time_zone);
    let (start_hour, end_hour) = window.hours();
    (
        local_minute_of_day(time_zone, date, start_hour * 60),
        local_minute_of_day(time_zone, date, end_hour * 60),
    )
}

/// A candidate conflicts with a padded busy interval when it starts before
/// the padded end and does not finish strictly before the padded start.
pub fn conflicts_with_padded(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    padded_start: DateTime<Utc>,
    padded_end: DateTime<Utc>,
) -> bool {
    start < padded_end && end >= padded_start
}

fn align_to_grid(origin: DateTime<Utc>, lower: DateTime<Utc>, step: i64) -> DateTime<Utc> {
    let offset = (lower - origin).num_minutes();
    if offset <= 0 {
        return origin;
    }
    let mut steps = offset / step;
    if origin + Duration::minutes(steps * step) < lower {
        steps += 1;
    }
    origin + Duration::minutes(steps * step)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::event::SOURCE_CALENDAR;
    use chrono::TimeZone;

    fn utc(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, hour, minute, 0).unwrap()
    }

    fn busy(start: DateTime<Utc>, end: DateTime<Utc>) -> BusyInterval {
        BusyInterval::new(start, end, SOURCE_CALENDAR).unwrap()
    }

    fn request(busy: &[BusyInterval], duration: i64, window: PreferredWindow) -> SlotRequest<'_> {
        SlotRequest {
            busy,
            duration_minutes: duration,
            time_zone: Tz::UTC,
            preferred_window: window,
        }
    }

    #[test]
    fn buffered_meeting_pushes_slot_to_half_past_ten() {
        let finder = SlotFinder::default();
        let meetings = [busy(utc(9, 0), utc(10, 0))];

        let result = finder.find_slot(&request(&meetings, 30, PreferredWindow::Morning), utc(7, 0));

        assert_eq!(
            result,
            PlacementResult::Placed {
                start: utc(10, 30),
                end: utc(11, 0)
            }
        );
    }

    #[test]
    fn free_band_places_at_band_start() {
        let finder = SlotFinder::default();
        let result = finder.find_slot(&request(&[], 60, PreferredWindow::Afternoon), utc(7, 0));
        // 12:00-13:00 is lunch.
        assert_eq!(result.slot(), Some((utc(13, 0), utc(14, 0))));

        let result = finder.find_slot(&request(&[], 45, PreferredWindow::Evening), utc(7, 0));
        assert_eq!(result.slot(), Some((utc(17, 0), utc(17, 45))));
    }

    #[test]
    fn floor_clips_band_and_lands_on_grid() {
        let finder = SlotFinder::default();
        let now = Utc.with_ymd_and_hms(2025, 5, 1, 9, 7, 42).unwrap();
        let result = finder.find_slot(&request(&[], 30, PreferredWindow::Morning), now);
        // floor 09:37, next grid point 09:45
        assert_eq!(result.slot(), Some((utc(9, 45), utc(10, 15))));
    }

    #[test]
    fn fully_covered_band_reports_no_slot() {
        let finder = SlotFinder::default();
        let covered = [busy(utc(8, 0), utc(12, 0))];
        let result = finder.find_slot(&request(&covered, 30, PreferredWindow::Morning), utc(6, 0));
        assert_eq!(
            result,
            PlacementResult::Failed {
                reason: PlacementFailure::NoSlot
            }
        );
    }

    #[test]
    fn closed_band_or_oversized_duration_is_outside_window() {
        let finder = SlotFinder::default();
        let late = finder.find_slot(&request(&[], 30, PreferredWindow::Morning), utc(11, 45));
        assert_eq!(
            late,
            PlacementResult::Failed {
                reason: PlacementFailure::OutsideWindow
            }
        );

        let too_long = finder.find_slot(&request(&[], 300, PreferredWindow::Morning), utc(6, 0));
        assert_eq!(
            too_long,
            PlacementResult::Failed {
                reason: PlacementFailure::OutsideWindow
            }
        );

        assert!(finder.band(PreferredWindow::Morning, &Tz::UTC, utc(11, 45)).is_none());
        assert!(finder.band(PreferredWindow::Any, &Tz::UTC, utc(11, 45)).is_some());
    }

    #[test]
    fn lunch_is_avoided_in_any_window() {
        let finder = SlotFinder::default();
        let result = finder.find_slot(&request(&[], 60, PreferredWindow::Any), utc(11, 15));
        // floor 11:45; 11:45-12:45 crosses lunch
        assert_eq!(result.slot(), Some((utc(13, 0), utc(14, 0))));
    }

    #[test]
    fn slots_never_touch_padded_busy_or_lunch() {
        let finder = SlotFinder::default();
        let meetings = [
            busy(utc(8, 15), utc(8, 45)),
            busy(utc(10, 0), utc(11, 0)),
            busy(utc(14, 0), utc(15, 30)),
            busy(utc(18, 0), utc(18, 30)),
        ];

        for duration in [15, 30, 45, 60, 90] {
            let result = finder.find_slot(&request(&meetings, duration, PreferredWindow::Any), utc(6, 0));
            let (start, end) = result.slot().expect("slot in a sparse day");
            for interval in &meetings {
                let (padded_start, padded_end) = interval.padded(30);
                assert!(!overlaps(start, end, padded_start, padded_end));
            }
            assert!(!overlaps(start, end, utc(12, 0), utc(13, 0)));
        }
    }

    #[test]
    fn policy_constants_are_configurable() {
        let finder = SlotFinder::new(SchedulingPolicy {
            buffer_minutes: 0,
            slot_granularity_minutes: 5,
            lead_minutes: 0,
            lunch_start_minute: 0,
            lunch_end_minute: 0,
        });
        let meetings = [busy(utc(9, 0), utc(10, 0))];
        let result = finder.find_slot(&request(&meetings, 30, PreferredWindow::Morning), utc(9, 2));
        assert_eq!(result.slot(), Some((utc(10, 0), utc(10, 30))));
    }

    #[test]
    fn band_hours_follow_the_local_zone() {
        let finder = SlotFinder::default();
        let tokyo = chrono_tz::Asia::Tokyo;
        // 2025-05-01 06:00 in Tokyo
        let now = Utc.with_ymd_and_hms(2025, 4, 30, 21, 0, 0).unwrap();
        let result = finder.find_slot(
            &SlotRequest {
                busy: &[],
                duration_minutes: 30,
                time_zone: tokyo,
                preferred_window: PreferredWindow::Morning,
            },
            now,
        );
        assert_eq!(result.slot(), Some((utc(23, 0) - Duration::days(1), utc(23, 30) - Duration::days(1))));
    }

    #[test]
    fn identical_inputs_yield_identical_slots() {
        let finder = SlotFinder::default();
        let meetings = [busy(utc(9, 0), utc(10, 0))];
        let first = finder.find_slot(&request(&meetings, 45, PreferredWindow::Any), utc(7, 0));
        let second = finder.find_slot(&request(&meetings, 45, PreferredWindow::Any), utc(7, 0));
        assert_eq!(first, second);
    }
}
