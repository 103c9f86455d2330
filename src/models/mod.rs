pub mod overtime;

pub use overtime::{
    is_approved_status, Admission, EmployeeId, OvertimeRecord, OvertimeStage, ScanApplied,
    ScanOutcome,
};
