use chrono::NaiveDateTime;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::{error::StatusNotice, overtime::DurationProjection};

use super::state::{SessionStatus, StopReason};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub session_id: Option<String>,
    pub started_at: Option<NaiveDateTime>,
    pub shutdown_armed: bool,
    pub stopped_at: Option<NaiveDateTime>,
    pub stop_reason: Option<StopReason>,
    pub last_decoded_text: Option<String>,
    pub last_scan_instant: Option<NaiveDateTime>,
}

/// Everything the kiosk front end renders.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "kebab-case")]
pub enum KioskEvent {
    SessionChanged(SessionSnapshot),
    Notice(StatusNotice),
    Durations(Vec<DurationProjection>),
}

/// Fire-and-forget event channel. A front end that went away must never
/// stall the scanner, so send failures are ignored.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<KioskEvent>>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<KioskEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: KioskEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }

    pub fn notice(&self, notice: StatusNotice) {
        self.emit(KioskEvent::Notice(notice));
    }
}
