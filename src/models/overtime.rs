use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

pub type EmployeeId = u64;

/// One employee's overtime for one work date. The approval workflow owns
/// `status`; scanning only ever fills `time_in` and then `time_out`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct OvertimeRecord {
    pub employee_id: EmployeeId,
    pub work_date: NaiveDate,
    pub status: String,
    pub time_in: Option<NaiveTime>,
    pub time_out: Option<NaiveTime>,
}

impl OvertimeRecord {
    pub fn approved(employee_id: EmployeeId, work_date: NaiveDate) -> Self {
        Self {
            employee_id,
            work_date,
            status: "Approved".into(),
            time_in: None,
            time_out: None,
        }
    }

    pub fn is_approved(&self) -> bool {
        is_approved_status(&self.status)
    }
}

/// Approval status text is free-form upstream; both spellings seen in the
/// HR backend count.
pub fn is_approved_status(status: &str) -> bool {
    let status = status.trim();
    status.eq_ignore_ascii_case("approved") || status.eq_ignore_ascii_case("approve")
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OvertimeStage {
    NotStarted,
    InProgress,
    Completed,
}

impl OvertimeStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            OvertimeStage::NotStarted => "not_started",
            OvertimeStage::InProgress => "in_progress",
            OvertimeStage::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScanOutcome {
    TimeInRecorded,
    TimeOutRecorded,
    AlreadyCompleted,
    Failed,
}

impl ScanOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanOutcome::TimeInRecorded => "time_in_recorded",
            ScanOutcome::TimeOutRecorded => "time_out_recorded",
            ScanOutcome::AlreadyCompleted => "already_completed",
            ScanOutcome::Failed => "failed",
        }
    }
}

/// Result of the single mutating store call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct ScanApplied {
    pub outcome: ScanOutcome,
    #[serde(default)]
    pub time_in: Option<NaiveTime>,
    #[serde(default)]
    pub time_out: Option<NaiveTime>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ScanApplied {
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            outcome: ScanOutcome::Failed,
            time_in: None,
            time_out: None,
            message: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Admission {
    pub approved: bool,
}
