use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    Stopped,
    Starting,
    Running,
}

impl Default for SessionStatus {
    fn default() -> Self {
        SessionStatus::Stopped
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum StopReason {
    Requested,
    HardShutdown,
    SourceClosed,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub status: SessionStatus,
    pub session_id: Option<String>,
    pub started_at: Option<NaiveDateTime>,
    pub shutdown_armed: bool,
    pub stopped_at: Option<NaiveDateTime>,
    pub stop_reason: Option<StopReason>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_stopped(&self) -> bool {
        self.status == SessionStatus::Stopped
    }

    pub fn begin_starting(&mut self) {
        self.status = SessionStatus::Starting;
    }

    /// Capability could not be acquired; nothing about the last session changes.
    pub fn abort_start(&mut self) {
        self.status = SessionStatus::Stopped;
    }

    pub fn mark_running(&mut self, session_id: String, started_at: NaiveDateTime) {
        *self = Self {
            status: SessionStatus::Running,
            session_id: Some(session_id),
            started_at: Some(started_at),
            shutdown_armed: true,
            stopped_at: None,
            stop_reason: None,
        };
    }

    pub fn stop(&mut self, at: NaiveDateTime, reason: StopReason) {
        self.status = SessionStatus::Stopped;
        self.shutdown_armed = false;
        self.stopped_at = Some(at);
        self.stop_reason = Some(reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn stopping_keeps_the_last_session_for_display() {
        let at = NaiveDate::from_ymd_opt(2026, 3, 2)
            .unwrap()
            .and_hms_opt(21, 0, 0)
            .unwrap();
        let mut state = SessionState::new();
        state.begin_starting();
        state.mark_running("abc".into(), at);
        assert!(state.shutdown_armed);

        state.stop(at, StopReason::HardShutdown);
        assert!(state.is_stopped());
        assert!(!state.shutdown_armed);
        assert_eq!(state.session_id.as_deref(), Some("abc"));
        assert_eq!(state.stop_reason, Some(StopReason::HardShutdown));
    }
}
