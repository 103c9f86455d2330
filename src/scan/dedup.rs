use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Suppression {
    /// Another scan from this session is still being handled.
    Busy,
    /// Same payload as the last accepted scan, inside the cool-down.
    Duplicate,
}

/// Per-session repeat filter. A decoder emits the same payload many times a
/// second while a badge stays in frame; only the first one gets through.
#[derive(Debug)]
pub struct ScanDeduplicator {
    window: Duration,
    last_decoded_text: Option<String>,
    last_scan_instant: Option<NaiveDateTime>,
    busy: bool,
}

impl ScanDeduplicator {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_decoded_text: None,
            last_scan_instant: None,
            busy: false,
        }
    }

    pub fn try_accept(&mut self, text: &str, now: NaiveDateTime) -> Result<(), Suppression> {
        if self.busy {
            return Err(Suppression::Busy);
        }

        if let (Some(last_text), Some(last_at)) = (&self.last_decoded_text, self.last_scan_instant) {
            if last_text == text && now - last_at < self.window {
                return Err(Suppression::Duplicate);
            }
        }

        self.busy = true;
        self.last_decoded_text = Some(text.to_string());
        self.last_scan_instant = Some(now);
        Ok(())
    }

    pub fn finish(&mut self) {
        self.busy = false;
    }

    pub fn is_busy(&self) -> bool {
        self.busy
    }

    pub fn last_decoded_text(&self) -> Option<&str> {
        self.last_decoded_text.as_deref()
    }

    pub fn last_scan_instant(&self) -> Option<NaiveDateTime> {
        self.last_scan_instant
    }
}

/// Shared handle used by decode callbacks, which may arrive from any task.
#[derive(Debug, Clone)]
pub struct SharedDeduplicator {
    inner: Arc<Mutex<ScanDeduplicator>>,
}

impl SharedDeduplicator {
    pub fn new(window: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ScanDeduplicator::new(window))),
        }
    }

    /// Claim the single in-flight slot. The returned guard frees it on drop,
    /// so every exit path of the pipeline releases the session.
    pub fn begin(&self, text: &str, now: NaiveDateTime) -> Result<InFlight, Suppression> {
        self.lock().try_accept(text, now)?;
        Ok(InFlight {
            inner: Arc::clone(&self.inner),
        })
    }

    pub fn is_busy(&self) -> bool {
        self.lock().is_busy()
    }

    pub fn last_scan(&self) -> (Option<String>, Option<NaiveDateTime>) {
        let guard = self.lock();
        (
            guard.last_decoded_text().map(str::to_string),
            guard.last_scan_instant(),
        )
    }

    fn lock(&self) -> MutexGuard<'_, ScanDeduplicator> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[must_use = "dropping the guard immediately releases the in-flight slot"]
pub struct InFlight {
    inner: Arc<Mutex<ScanDeduplicator>>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        let mut guard = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        guard.finish();
    }
}
