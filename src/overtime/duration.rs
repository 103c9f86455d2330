use std::fmt;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use serde::Serialize;

use crate::models::{EmployeeId, OvertimeRecord, OvertimeStage};

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Whole hours and minutes, floored to the minute.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
pub struct Elapsed {
    pub hours: i64,
    pub minutes: i64,
}

impl Elapsed {
    pub fn from_seconds(seconds: i64) -> Self {
        let total_minutes = seconds.max(0) / 60;
        Self {
            hours: total_minutes / 60,
            minutes: total_minutes % 60,
        }
    }
}

impl fmt::Display for Elapsed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}h {}m", self.hours, self.minutes)
    }
}

/// Elapsed time between two times of day. An end before the start means the
/// span crossed midnight.
pub fn span_between(start: NaiveTime, end: NaiveTime) -> Elapsed {
    let mut seconds = (end - start).num_seconds();
    if seconds < 0 {
        seconds += SECONDS_PER_DAY;
    }
    Elapsed::from_seconds(seconds)
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DurationProjection {
    pub employee_id: EmployeeId,
    pub work_date: NaiveDate,
    pub stage: OvertimeStage,
    pub elapsed: Elapsed,
    pub display: String,
    /// No further refreshes will change this value.
    pub frozen: bool,
}

/// Display-only duration for a record. Records that have not started yet
/// have nothing to show.
pub fn project(
    record: &OvertimeRecord,
    now: NaiveDateTime,
    shift_end_bound: NaiveTime,
) -> Option<DurationProjection> {
    let (elapsed, frozen) = match (record.stage(), record.time_in, record.time_out) {
        (OvertimeStage::Completed, Some(time_in), Some(time_out)) => {
            (span_between(time_in, time_out), true)
        }
        (OvertimeStage::InProgress, Some(time_in), None) => {
            let started = record.work_date.and_time(time_in);
            let mut bound = record.work_date.and_time(shift_end_bound);
            if shift_end_bound < time_in {
                bound += Duration::days(1);
            }
            let end = now.min(bound);
            (
                Elapsed::from_seconds((end - started).num_seconds()),
                now >= bound,
            )
        }
        _ => return None,
    };

    Some(DurationProjection {
        employee_id: record.employee_id,
        work_date: record.work_date,
        stage: record.stage(),
        display: elapsed.to_string(),
        elapsed,
        frozen,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn in_progress(time_in: NaiveTime) -> OvertimeRecord {
        OvertimeRecord {
            time_in: Some(time_in),
            ..OvertimeRecord::approved(42, day())
        }
    }

    #[test]
    fn live_elapsed_before_shift_end() {
        let rec = in_progress(t(20, 30));
        let projection = project(&rec, day().and_time(t(21, 15)), t(22, 0)).unwrap();
        assert_eq!(projection.display, "0h 45m");
        assert!(!projection.frozen);
    }

    #[test]
    fn elapsed_is_capped_at_shift_end() {
        let rec = in_progress(t(20, 30));
        let projection = project(&rec, day().and_time(t(22, 30)), t(22, 0)).unwrap();
        assert_eq!(projection.display, "1h 30m");
        assert!(projection.frozen);
    }

    #[test]
    fn elapsed_floors_partial_minutes() {
        let rec = in_progress(t(20, 30));
        let now = day().and_hms_opt(20, 31, 59).unwrap();
        let projection = project(&rec, now, t(22, 0)).unwrap();
        assert_eq!(projection.elapsed, Elapsed { hours: 0, minutes: 1 });
    }

    #[test]
    fn completed_record_is_frozen_at_time_out() {
        let rec = OvertimeRecord {
            time_in: Some(t(20, 30)),
            time_out: Some(t(21, 10)),
            ..OvertimeRecord::approved(42, day())
        };
        let later = day().and_time(t(23, 0));
        let projection = project(&rec, later, t(22, 0)).unwrap();
        assert_eq!(projection.display, "0h 40m");
        assert!(projection.frozen);
    }

    #[test]
    fn time_out_past_midnight_wraps() {
        assert_eq!(span_between(t(23, 0), t(0, 15)).to_string(), "1h 15m");
    }

    #[test]
    fn overnight_shift_bound_rolls_to_next_day() {
        let rec = in_progress(t(23, 0));
        let next_day = day().succ_opt().unwrap();
        let projection = project(&rec, next_day.and_time(t(0, 30)), t(1, 0)).unwrap();
        assert_eq!(projection.display, "1h 30m");
        assert!(!projection.frozen);
    }

    #[test]
    fn not_started_has_no_projection() {
        let rec = OvertimeRecord::approved(42, day());
        assert!(project(&rec, day().and_time(t(21, 0)), t(22, 0)).is_none());
    }
}
