use std::time::Duration;

use chrono::{NaiveDateTime, NaiveTime};

use crate::{
    error::{DenialReason, ScanError},
    models::EmployeeId,
    overtime::truncate_to_second,
    settings::ScanPolicy,
    store::{bounded, RecordStore},
};

/// Inclusive time-of-day range. A start later than the end wraps past
/// midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl ClockWindow {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, time: NaiveTime) -> bool {
        let time = truncate_to_second(time);
        if self.start <= self.end {
            self.start <= time && time <= self.end
        } else {
            time >= self.start || time <= self.end
        }
    }
}

/// Decides whether a decoded scan may reach the state machine. Nothing is
/// cached: approval and the wall clock can both change during a session.
#[derive(Debug, Clone)]
pub struct AdmissionGate {
    window: ClockWindow,
    timeout: Duration,
}

impl AdmissionGate {
    pub fn new(window: ClockWindow, timeout: Duration) -> Self {
        Self { window, timeout }
    }

    pub fn from_policy(policy: &ScanPolicy) -> Self {
        Self::new(
            ClockWindow::new(policy.allowed_start, policy.allowed_end),
            policy.store_timeout(),
        )
    }

    pub fn check_window(&self, employee_id: EmployeeId, now: NaiveDateTime) -> Result<(), ScanError> {
        if self.window.contains(now.time()) {
            Ok(())
        } else {
            Err(ScanError::AdmissionDenied {
                employee_id,
                reason: DenialReason::OutsideWindow,
            })
        }
    }

    /// Window first so out-of-hours scans never hit the store.
    pub async fn admit(
        &self,
        store: &dyn RecordStore,
        employee_id: EmployeeId,
        now: NaiveDateTime,
    ) -> Result<(), ScanError> {
        self.check_window(employee_id, now)?;

        let admission = bounded(
            self.timeout,
            "approval lookup",
            store.query_admission(employee_id, now.date()),
        )
        .await?;

        if admission.approved {
            Ok(())
        } else {
            Err(ScanError::AdmissionDenied {
                employee_id,
                reason: DenialReason::NotApproved,
            })
        }
    }
}
