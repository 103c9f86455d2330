use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::models::{EmployeeId, OvertimeRecord, OvertimeStage, ScanApplied, ScanOutcome};

use super::duration::{project, DurationProjection};

/// Today's records as the operator currently sees them. Seeded from the
/// store when a session starts and patched from every scan response; the
/// store stays the source of truth.
#[derive(Debug, Default, Clone)]
pub struct OvertimeBoard {
    work_date: Option<NaiveDate>,
    records: BTreeMap<EmployeeId, OvertimeRecord>,
}

impl OvertimeBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(&mut self, work_date: NaiveDate, records: Vec<OvertimeRecord>) {
        self.work_date = Some(work_date);
        self.records = records
            .into_iter()
            .filter(|record| record.work_date == work_date)
            .map(|record| (record.employee_id, record))
            .collect();
    }

    /// Drop everything when the calendar day changed under a running session.
    pub fn roll_over(&mut self, today: NaiveDate) -> bool {
        if self.work_date == Some(today) {
            return false;
        }
        self.work_date = Some(today);
        self.records.clear();
        true
    }

    pub fn record_scan(&mut self, employee_id: EmployeeId, work_date: NaiveDate, applied: &ScanApplied) {
        if applied.outcome == ScanOutcome::Failed {
            return;
        }
        self.roll_over(work_date);

        let record = self
            .records
            .entry(employee_id)
            .or_insert_with(|| OvertimeRecord::approved(employee_id, work_date));
        if applied.time_in.is_some() {
            record.time_in = applied.time_in;
        }
        if applied.time_out.is_some() {
            record.time_out = applied.time_out;
        }
    }

    pub fn has_in_progress(&self) -> bool {
        self.records
            .values()
            .any(|record| record.stage() == OvertimeStage::InProgress)
    }

    pub fn projections(&self, now: NaiveDateTime, shift_end_bound: NaiveTime) -> Vec<DurationProjection> {
        self.records
            .values()
            .filter_map(|record| project(record, now, shift_end_bound))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 2).unwrap()
    }

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn applied(outcome: ScanOutcome, time_in: Option<NaiveTime>, time_out: Option<NaiveTime>) -> ScanApplied {
        ScanApplied {
            outcome,
            time_in,
            time_out,
            message: None,
        }
    }

    #[test]
    fn scan_responses_patch_the_board() {
        let mut board = OvertimeBoard::new();
        board.load(day(), vec![OvertimeRecord::approved(42, day())]);
        assert!(!board.has_in_progress());

        board.record_scan(42, day(), &applied(ScanOutcome::TimeInRecorded, Some(t(20, 31)), None));
        assert!(board.has_in_progress());

        board.record_scan(
            42,
            day(),
            &applied(ScanOutcome::TimeOutRecorded, Some(t(20, 31)), Some(t(21, 10))),
        );
        assert!(!board.has_in_progress());
        let projections = board.projections(day().and_time(t(21, 30)), t(22, 0));
        assert_eq!(projections[0].display, "0h 39m");
        assert!(projections[0].frozen);
    }

    #[test]
    fn failed_scans_leave_the_board_alone() {
        let mut board = OvertimeBoard::new();
        board.load(day(), Vec::new());
        board.record_scan(7, day(), &ScanApplied::failed("store offline"));
        assert!(!board.has_in_progress());
        assert!(board.projections(day().and_time(t(21, 0)), t(22, 0)).is_empty());
    }

    #[test]
    fn new_day_clears_yesterdays_records() {
        let mut board = OvertimeBoard::new();
        board.load(
            day(),
            vec![OvertimeRecord {
                time_in: Some(t(20, 30)),
                ..OvertimeRecord::approved(42, day())
            }],
        );
        let tomorrow = day().succ_opt().unwrap();

        assert!(board.roll_over(tomorrow));
        assert!(!board.has_in_progress());
        assert!(board.projections(tomorrow.and_time(t(21, 0)), t(22, 0)).is_empty());
        assert!(!board.roll_over(tomorrow));
    }

    #[test]
    fn only_started_records_are_projected() {
        let mut board = OvertimeBoard::new();
        board.load(
            day(),
            vec![
                OvertimeRecord::approved(1, day()),
                OvertimeRecord {
                    time_in: Some(t(20, 30)),
                    ..OvertimeRecord::approved(2, day())
                },
            ],
        );
        let projections = board.projections(day().and_time(t(21, 0)), t(22, 0));
        assert_eq!(projections.len(), 1);
        assert_eq!(projections[0].employee_id, 2);
        assert_eq!(projections[0].display, "0h 30m");
    }
}
