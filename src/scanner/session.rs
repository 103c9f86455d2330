use std::sync::{Mutex, MutexGuard};

use chrono::{Duration, NaiveDateTime};
use tokio_util::sync::CancellationToken;

use crate::{overtime::OvertimeBoard, scan::SharedDeduplicator};

/// One start-to-stop run of the scanner. Everything a decode callback needs
/// hangs off this value, so two kiosks, or two generations of the same
/// kiosk, never share a busy flag or a last-seen payload.
#[derive(Debug)]
pub struct ScanSession {
    pub id: String,
    pub started_at: NaiveDateTime,
    cancel: CancellationToken,
    dedup: SharedDeduplicator,
    board: Mutex<OvertimeBoard>,
}

impl ScanSession {
    pub fn new(id: String, started_at: NaiveDateTime, dedup_window: Duration) -> Self {
        Self {
            id,
            started_at,
            cancel: CancellationToken::new(),
            dedup: SharedDeduplicator::new(dedup_window),
            board: Mutex::new(OvertimeBoard::new()),
        }
    }

    pub fn is_active(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn dedup(&self) -> &SharedDeduplicator {
        &self.dedup
    }

    pub fn board(&self) -> MutexGuard<'_, OvertimeBoard> {
        match self.board.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
