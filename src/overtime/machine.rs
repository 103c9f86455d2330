use chrono::{NaiveTime, Timelike};

use crate::models::{OvertimeRecord, OvertimeStage, ScanApplied, ScanOutcome};

/// A planned mutation of one record. Stores apply it atomically; the plan
/// itself is pure so every store advances records the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    SetTimeIn(NaiveTime),
    SetTimeOut(NaiveTime),
    Unchanged,
}

impl Transition {
    pub fn outcome(&self) -> ScanOutcome {
        match self {
            Transition::SetTimeIn(_) => ScanOutcome::TimeInRecorded,
            Transition::SetTimeOut(_) => ScanOutcome::TimeOutRecorded,
            Transition::Unchanged => ScanOutcome::AlreadyCompleted,
        }
    }
}

impl OvertimeRecord {
    pub fn stage(&self) -> OvertimeStage {
        match (self.time_in, self.time_out) {
            (None, _) => OvertimeStage::NotStarted,
            (Some(_), None) => OvertimeStage::InProgress,
            (Some(_), Some(_)) => OvertimeStage::Completed,
        }
    }

    /// Decide what a scan at `now` does to this record.
    pub fn plan_scan(&self, now: NaiveTime) -> Transition {
        let now = truncate_to_second(now);
        match self.stage() {
            OvertimeStage::NotStarted => Transition::SetTimeIn(now),
            OvertimeStage::InProgress => Transition::SetTimeOut(now),
            OvertimeStage::Completed => Transition::Unchanged,
        }
    }

    pub fn apply(&mut self, transition: Transition) {
        match transition {
            Transition::SetTimeIn(at) => self.time_in = Some(at),
            Transition::SetTimeOut(at) => self.time_out = Some(at),
            Transition::Unchanged => {}
        }
    }

    /// Plan, apply and report in one step, for in-process stores.
    pub fn advance(&mut self, now: NaiveTime) -> ScanApplied {
        let transition = self.plan_scan(now);
        self.apply(transition);
        ScanApplied {
            outcome: transition.outcome(),
            time_in: self.time_in,
            time_out: self.time_out,
            message: None,
        }
    }
}

pub fn truncate_to_second(time: NaiveTime) -> NaiveTime {
    time.with_nanosecond(0).unwrap_or(time)
}
