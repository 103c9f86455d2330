//! Operator-facing failures of the scan pipeline.
//!
//! Infrastructure code (stores, settings, database) works in `anyhow`; the
//! controller converts whatever reaches it into one of these so that every
//! rejected scan turns into exactly one status notice.

use serde::Serialize;

use crate::models::EmployeeId;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    OutsideWindow,
    NotApproved,
}

impl DenialReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenialReason::OutsideWindow => "outside allowed window",
            DenialReason::NotApproved => "no approved request for today",
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ScanError {
    #[error("invalid QR code: {0}")]
    DecodeFailure(String),

    #[error("scan denied for employee {employee_id}: {}", reason.as_str())]
    AdmissionDenied {
        employee_id: EmployeeId,
        reason: DenialReason,
    },

    #[error("failed to record overtime: {0}")]
    PersistenceFailure(String),

    #[error("camera permission denied or unavailable: {0}")]
    CapabilityUnavailable(String),

    #[error("scanner closed; contact HR/Admin to reopen")]
    HardShutdown,

    #[error("a scanner session is already active")]
    SessionActive,

    #[error("scanner start cancelled")]
    StartCancelled,
}

impl ScanError {
    pub fn level(&self) -> NoticeLevel {
        match self {
            ScanError::StartCancelled => NoticeLevel::Info,
            ScanError::AdmissionDenied { .. } | ScanError::SessionActive => NoticeLevel::Warning,
            ScanError::DecodeFailure(_)
            | ScanError::PersistenceFailure(_)
            | ScanError::CapabilityUnavailable(_)
            | ScanError::HardShutdown => NoticeLevel::Error,
        }
    }

    /// Whether the session keeps scanning after this error.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanError::CapabilityUnavailable(_) | ScanError::HardShutdown
        )
    }

    pub fn notice(&self) -> StatusNotice {
        let employee_id = match self {
            ScanError::AdmissionDenied { employee_id, .. } => Some(*employee_id),
            _ => None,
        };
        StatusNotice {
            level: self.level(),
            message: self.to_string(),
            employee_id,
            terminal: self.is_terminal(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    Success,
    Info,
    Warning,
    Error,
}

impl NoticeLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoticeLevel::Success => "success",
            NoticeLevel::Info => "info",
            NoticeLevel::Warning => "warning",
            NoticeLevel::Error => "error",
        }
    }
}

/// Short status line shown to whoever is standing at the scanner.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StatusNotice {
    pub level: NoticeLevel,
    pub message: String,
    pub employee_id: Option<EmployeeId>,
    pub terminal: bool,
}

impl StatusNotice {
    pub fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            employee_id: None,
            terminal: false,
        }
    }

    pub fn for_employee(mut self, employee_id: EmployeeId) -> Self {
        self.employee_id = Some(employee_id);
        self
    }
}
