use std::sync::Arc;

use chrono::{NaiveDateTime, NaiveTime};
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use uuid::Uuid;

use crate::{
    clock::Clock,
    error::{NoticeLevel, ScanError, StatusNotice},
    models::{EmployeeId, ScanApplied, ScanOutcome},
    overtime::{span_between, truncate_to_second, DurationProjection},
    scan::{decode_identity, AdmissionGate, Suppression},
    settings::ScanPolicy,
    store::{bounded, RecordStore},
};

use super::{
    capability::ScanCapability,
    events::{EventSink, KioskEvent, SessionSnapshot},
    session::ScanSession,
    state::{SessionState, SessionStatus, StopReason},
};

// Set to false to silence per-scan logging from the session loops.
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

/// What became of one decoded payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanDisposition {
    /// No running session, or the session stopped before the scan could apply.
    Inactive,
    Suppressed(Suppression),
    Rejected(ScanError),
    Recorded {
        employee_id: EmployeeId,
        applied: ScanApplied,
    },
}

/// The two periodic timers and the decode feed of one session. They all
/// watch the session's cancellation token and are torn down together.
struct SessionTasks {
    feed: JoinHandle<()>,
    shutdown_watch: JoinHandle<()>,
    duration_refresh: JoinHandle<()>,
}

impl SessionTasks {
    async fn join(self) {
        for (name, handle) in [
            ("feed", self.feed),
            ("shutdown watch", self.shutdown_watch),
            ("duration refresh", self.duration_refresh),
        ] {
            if let Err(err) = handle.await {
                if !err.is_cancelled() {
                    log_error!("scanner {name} task failed: {err}");
                }
            }
        }
    }
}

#[derive(Default)]
struct Runtime {
    state: SessionState,
    /// Session being set up while `Starting`; promoted to `session` once
    /// its tasks run. A stop during that window cancels it here.
    pending: Option<Arc<ScanSession>>,
    session: Option<Arc<ScanSession>>,
    tasks: Option<SessionTasks>,
}

impl Runtime {
    fn owns_pending(&self, session: &ScanSession) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|pending| pending.id == session.id)
    }
}

/// Owns the scanner session lifecycle and runs every decoded payload through
/// decode, admission, de-duplication and the record state machine.
#[derive(Clone)]
pub struct ScannerController {
    runtime: Arc<Mutex<Runtime>>,
    store: Arc<dyn RecordStore>,
    capability: Arc<dyn ScanCapability>,
    clock: Arc<dyn Clock>,
    policy: Arc<ScanPolicy>,
    gate: AdmissionGate,
    events: EventSink,
}

impl ScannerController {
    pub fn new(
        store: Arc<dyn RecordStore>,
        capability: Arc<dyn ScanCapability>,
        clock: Arc<dyn Clock>,
        policy: ScanPolicy,
        events: EventSink,
    ) -> Self {
        Self {
            runtime: Arc::new(Mutex::new(Runtime::default())),
            store,
            capability,
            clock,
            gate: AdmissionGate::from_policy(&policy),
            policy: Arc::new(policy),
            events,
        }
    }

    pub async fn snapshot(&self) -> SessionSnapshot {
        let runtime = self.runtime.lock().await;
        let (last_decoded_text, last_scan_instant) = runtime
            .session
            .as_ref()
            .map(|session| session.dedup().last_scan())
            .unwrap_or((None, None));
        let state = &runtime.state;
        SessionSnapshot {
            status: state.status,
            session_id: state.session_id.clone(),
            started_at: state.started_at,
            shutdown_armed: state.shutdown_armed,
            stopped_at: state.stopped_at,
            stop_reason: state.stop_reason,
            last_decoded_text,
            last_scan_instant,
        }
    }

    pub async fn status(&self) -> SessionStatus {
        self.runtime.lock().await.state.status
    }

    pub async fn start(&self) -> Result<SessionSnapshot, ScanError> {
        let session = {
            let mut runtime = self.runtime.lock().await;
            if !runtime.state.is_stopped() {
                return Err(ScanError::SessionActive);
            }
            runtime.state.begin_starting();
            let session = Arc::new(ScanSession::new(
                Uuid::new_v4().to_string(),
                self.clock.now(),
                self.policy.dedup_window(),
            ));
            runtime.pending = Some(Arc::clone(&session));
            session
        };
        self.emit_session_changed().await;

        let feed = match self.capability.acquire().await {
            Ok(feed) => feed,
            Err(err) => {
                {
                    let mut runtime = self.runtime.lock().await;
                    if runtime.owns_pending(&session) {
                        runtime.pending = None;
                        runtime.state.abort_start();
                    }
                }
                let error = ScanError::CapabilityUnavailable(format!("{err:#}"));
                log_warn!("scanner capability unavailable: {err:#}");
                self.events.notice(error.notice());
                self.emit_session_changed().await;
                return Err(error);
            }
        };

        if !session.is_active() {
            return Err(self.abandon_start(&session, StopReason::Requested).await);
        }

        // Starting after the cutoff must neither leave a live scanner behind
        // nor announce one.
        if self.cutoff_reached(self.clock.now()) {
            let error = self.abandon_start(&session, StopReason::HardShutdown).await;
            if error == ScanError::HardShutdown {
                log_warn!("scanner start refused after cutoff {}", self.policy.shutdown_at);
                self.events.notice(error.notice());
                self.emit_session_changed().await;
            }
            return Err(error);
        }

        tokio::select! {
            _ = session.cancel_token().cancelled() => {}
            _ = self.seed_board(&session, self.clock.now()) => {}
        }

        {
            // Tasks are spawned under the lock so none of them can observe a
            // half-registered session.
            let mut runtime = self.runtime.lock().await;
            if !session.is_active() || !runtime.owns_pending(&session) {
                drop(runtime);
                return Err(self.abandon_start(&session, StopReason::Requested).await);
            }
            let tasks = SessionTasks {
                feed: tokio::spawn(feed_loop(self.clone(), Arc::clone(&session), feed)),
                shutdown_watch: tokio::spawn(shutdown_watch(self.clone(), Arc::clone(&session))),
                duration_refresh: tokio::spawn(duration_refresh(self.clone(), Arc::clone(&session))),
            };
            runtime.pending = None;
            runtime.state.mark_running(session.id.clone(), session.started_at);
            runtime.session = Some(Arc::clone(&session));
            runtime.tasks = Some(tasks);
        }

        log_info!("scanner session {} started at {}", session.id, session.started_at);
        self.events
            .notice(StatusNotice::new(NoticeLevel::Info, "Scanner ready"));
        self.emit_session_changed().await;
        self.publish_durations(&session);

        Ok(self.snapshot().await)
    }

    /// Manual restart after an explicit stop or a hard shutdown.
    pub async fn resume(&self) -> Result<SessionSnapshot, ScanError> {
        log_info!("resuming scanner");
        self.start().await
    }

    pub async fn stop(&self) -> SessionSnapshot {
        if self.cancel_pending_start().await {
            self.events
                .notice(StatusNotice::new(NoticeLevel::Info, "Scanner stopped"));
            self.emit_session_changed().await;
            return self.snapshot().await;
        }

        if let Some(tasks) = self.teardown(None, StopReason::Requested).await {
            tasks.join().await;
            self.events
                .notice(StatusNotice::new(NoticeLevel::Info, "Scanner stopped"));
            self.emit_session_changed().await;
        }
        self.snapshot().await
    }

    /// Decode callback for capabilities that push instead of being polled.
    pub async fn on_decoded(&self, text: &str) -> ScanDisposition {
        let session = self.runtime.lock().await.session.clone();
        match session {
            Some(session) => self.process(&session, text).await,
            None => ScanDisposition::Inactive,
        }
    }

    /// Live durations for the running session's board.
    pub async fn durations(&self) -> Vec<DurationProjection> {
        let Some(session) = self.runtime.lock().await.session.clone() else {
            return Vec::new();
        };
        let projections = session
            .board()
            .projections(self.clock.now(), self.policy.shift_end_bound);
        projections
    }

    async fn process(&self, session: &ScanSession, text: &str) -> ScanDisposition {
        if !session.is_active() {
            return ScanDisposition::Inactive;
        }

        let now = self.clock.now();
        let _in_flight = match session.dedup().begin(text, now) {
            Ok(guard) => guard,
            Err(suppression) => {
                log_debug!("scan suppressed ({suppression:?})");
                return ScanDisposition::Suppressed(suppression);
            }
        };

        match self.run_pipeline(session, text, now).await {
            Ok(Some((employee_id, applied))) => {
                session.board().record_scan(employee_id, now.date(), &applied);
                log_info!(
                    "employee {} scan at {}: {}",
                    employee_id,
                    now.time(),
                    applied.outcome.as_str()
                );
                self.events.notice(outcome_notice(employee_id, &applied));
                self.publish_durations(session);
                ScanDisposition::Recorded {
                    employee_id,
                    applied,
                }
            }
            Ok(None) => {
                log_info!("session {} stopped while a scan was in flight; dropped", session.id);
                ScanDisposition::Inactive
            }
            Err(error) => {
                log_warn!("scan rejected: {error}");
                self.events.notice(error.notice());
                ScanDisposition::Rejected(error)
            }
        }
    }

    async fn run_pipeline(
        &self,
        session: &ScanSession,
        text: &str,
        now: NaiveDateTime,
    ) -> Result<Option<(EmployeeId, ScanApplied)>, ScanError> {
        let employee_id = decode_identity(text)?;

        let admitted = tokio::select! {
            _ = session.cancel_token().cancelled() => return Ok(None),
            admitted = self.gate.admit(self.store.as_ref(), employee_id, now) => admitted,
        };
        admitted?;

        // The mutating call is never raced against cancellation: once issued
        // its result is reported, but it is not issued for a stopped session.
        if !session.is_active() {
            return Ok(None);
        }

        let applied = bounded(
            self.policy.store_timeout(),
            "recording overtime",
            self.store
                .apply_scan(employee_id, now.date(), truncate_to_second(now.time())),
        )
        .await?;

        if applied.outcome == ScanOutcome::Failed {
            let reason = applied
                .message
                .unwrap_or_else(|| "record store rejected the scan".to_string());
            return Err(ScanError::PersistenceFailure(reason));
        }

        Ok(Some((employee_id, applied)))
    }

    async fn seed_board(&self, session: &ScanSession, now: NaiveDateTime) {
        let today = now.date();
        match bounded(
            self.policy.store_timeout(),
            "loading today's overtime",
            self.store.records_for_date(today),
        )
        .await
        {
            Ok(records) => session.board().load(today, records),
            Err(err) => {
                log_warn!("starting with an empty board: {err}");
                session.board().roll_over(today);
            }
        }
    }

    fn cutoff_reached(&self, now: NaiveDateTime) -> bool {
        truncate_to_second(now.time()) >= self.policy.shutdown_at
    }

    fn publish_durations(&self, session: &ScanSession) {
        let projections = session
            .board()
            .projections(self.clock.now(), self.policy.shift_end_bound);
        if !projections.is_empty() {
            self.events.emit(KioskEvent::Durations(projections));
        }
    }

    async fn hard_shutdown(&self, session: &ScanSession) {
        if self
            .teardown(Some(&session.id), StopReason::HardShutdown)
            .await
            .is_none()
        {
            return;
        }
        log_warn!("scanner session {} closed at cutoff {}", session.id, self.policy.shutdown_at);
        self.events.notice(ScanError::HardShutdown.notice());
        self.emit_session_changed().await;
    }

    async fn source_closed(&self, session: &ScanSession) {
        if self
            .teardown(Some(&session.id), StopReason::SourceClosed)
            .await
            .is_none()
        {
            return;
        }
        self.events.notice(StatusNotice::new(
            NoticeLevel::Warning,
            "Scanner input disconnected",
        ));
        self.emit_session_changed().await;
    }

    /// Stop requested while `start` is still acquiring the device or loading
    /// the board. `start` sees the cancelled token and backs out.
    async fn cancel_pending_start(&self) -> bool {
        let mut runtime = self.runtime.lock().await;
        let Some(pending) = runtime.pending.take() else {
            return false;
        };
        pending.cancel();
        runtime.state.stop(self.clock.now(), StopReason::Requested);
        log_info!("scanner start {} cancelled before it was running", pending.id);
        true
    }

    /// Back out of a start that was cancelled or refused. The device is only
    /// released when no newer start has claimed it in the meantime. Returns
    /// the error `start` should report.
    async fn abandon_start(&self, session: &ScanSession, reason: StopReason) -> ScanError {
        let mut runtime = self.runtime.lock().await;
        let refused = runtime.owns_pending(session);
        if refused {
            runtime.pending = None;
            runtime.state.stop(self.clock.now(), reason);
        }
        session.cancel();
        if runtime.pending.is_none() && runtime.session.is_none() {
            self.capability.release().await;
        }

        match reason {
            StopReason::HardShutdown if refused => ScanError::HardShutdown,
            _ => ScanError::StartCancelled,
        }
    }

    /// Detach the running session, cancel it and release the device. Returns
    /// the session's tasks so an outside caller can join them; the tasks
    /// themselves must not. `expected` guards against a stale task stopping a
    /// newer session.
    async fn teardown(&self, expected: Option<&str>, reason: StopReason) -> Option<SessionTasks> {
        let (session, tasks) = {
            let mut runtime = self.runtime.lock().await;
            let session = runtime.session.as_ref()?;
            if expected.is_some_and(|id| id != session.id) {
                return None;
            }
            let session = runtime.session.take()?;
            let tasks = runtime.tasks.take();
            runtime.state.stop(self.clock.now(), reason);
            (session, tasks)
        };

        session.cancel();
        self.capability.release().await;
        log_info!("scanner session {} stopped ({reason:?})", session.id);
        tasks
    }

    async fn emit_session_changed(&self) {
        let snapshot = self.snapshot().await;
        self.events.emit(KioskEvent::SessionChanged(snapshot));
    }
}

fn outcome_notice(employee_id: EmployeeId, applied: &ScanApplied) -> StatusNotice {
    let at = |time: Option<NaiveTime>| {
        time.map(|t| t.format("%H:%M").to_string())
            .unwrap_or_else(|| "--:--".into())
    };
    let notice = match applied.outcome {
        ScanOutcome::TimeInRecorded => StatusNotice::new(
            NoticeLevel::Success,
            format!("Time-in recorded for employee {employee_id} at {}", at(applied.time_in)),
        ),
        ScanOutcome::TimeOutRecorded => {
            let worked = match (applied.time_in, applied.time_out) {
                (Some(time_in), Some(time_out)) => format!(" ({})", span_between(time_in, time_out)),
                _ => String::new(),
            };
            StatusNotice::new(
                NoticeLevel::Success,
                format!(
                    "Time-out recorded for employee {employee_id} at {}{worked}",
                    at(applied.time_out)
                ),
            )
        }
        ScanOutcome::AlreadyCompleted => StatusNotice::new(
            NoticeLevel::Info,
            format!("Overtime already completed today for employee {employee_id}"),
        ),
        ScanOutcome::Failed => StatusNotice::new(NoticeLevel::Error, "Failed to record overtime"),
    };
    notice.for_employee(employee_id)
}

async fn feed_loop(controller: ScannerController, session: Arc<ScanSession>, mut feed: mpsc::Receiver<String>) {
    loop {
        let text = tokio::select! {
            _ = session.cancel_token().cancelled() => break,
            next = feed.recv() => match next {
                Some(text) => text,
                None => {
                    log_warn!("scan source for session {} closed", session.id);
                    controller.source_closed(&session).await;
                    break;
                }
            },
        };
        controller.process(&session, &text).await;
    }
}

async fn shutdown_watch(controller: ScannerController, session: Arc<ScanSession>) {
    // The check at start already covered "now"; the first periodic check
    // is one interval out.
    let period = controller.policy.shutdown_poll_interval();
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = session.cancel_token().cancelled() => break,
            _ = ticker.tick() => {
                if controller.cutoff_reached(controller.clock.now()) {
                    controller.hard_shutdown(&session).await;
                    break;
                }
            }
        }
    }
}

async fn duration_refresh(controller: ScannerController, session: Arc<ScanSession>) {
    let period = controller.policy.duration_refresh_interval();
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = session.cancel_token().cancelled() => break,
            _ = ticker.tick() => {
                let in_progress = session.board().has_in_progress();
                if in_progress {
                    log_debug!("refreshing live durations for session {}", session.id);
                    controller.publish_durations(&session);
                }
            }
        }
    }
}
