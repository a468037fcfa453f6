use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, error, info};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio::time::{Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::api::{ApiError, Backend};
use crate::auth::AuthContext;
use crate::capture::{CaptureError, FrameSource, Sampler};
use crate::clock::SessionClock;
use crate::config::EngineConfig;
use crate::events::{EndReason, EngineEvent};
use crate::ledger::{AttendanceLedger, LedgerError};
use crate::models::{
    AttendanceLog, AttendanceStatus, ClassId, DisplayStatus, Session, SessionId, Student, UserId,
};
use crate::poller::{PollerController, PollerPhase, PollerShared};

use super::state::{ActiveAttendance, EndDecision, SessionPhase, SessionSlot};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("only teachers may manage attendance sessions")]
    Forbidden,
    #[error("an attendance session is already active")]
    AlreadyActive,
    #[error("no active attendance session")]
    NoActiveSession,
    #[error("session {0} has already ended")]
    AlreadyEnded(SessionId),
    #[error("session duration must be at least one minute")]
    InvalidDuration,
    #[error("camera is already taking attendance")]
    CameraActive,
    #[error(transparent)]
    Device(#[from] CaptureError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("internal failure: {0}")]
    Internal(String),
}

fn internal(err: anyhow::Error) -> SessionError {
    SessionError::Internal(format!("{err:#}"))
}

/// Drives one attendance session at a time: opens it against the backend,
/// runs the countdown clock, owns the recognition poller and the ledger,
/// and performs the single `ongoing -> ended` transition.
///
/// Clone-cheap; clones share the same session slot.
#[derive(Clone)]
pub struct SessionController {
    backend: Arc<dyn Backend>,
    auth: AuthContext,
    config: EngineConfig,
    slot: Arc<Mutex<SessionSlot>>,
    poller: Arc<Mutex<PollerController>>,
    clock_cancel: Arc<std::sync::Mutex<Option<CancellationToken>>>,
    events: broadcast::Sender<EngineEvent>,
}

impl SessionController {
    pub fn new(backend: Arc<dyn Backend>, auth: AuthContext, config: EngineConfig) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            backend,
            auth,
            config,
            slot: Arc::new(Mutex::new(SessionSlot::Idle)),
            poller: Arc::new(Mutex::new(PollerController::new())),
            clock_cancel: Arc::new(std::sync::Mutex::new(None)),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Open a new attendance window for `class_id`. `duration_minutes`
    /// falls back to the configured default (45 min).
    pub async fn start_session(
        &self,
        class_id: ClassId,
        duration_minutes: Option<i64>,
    ) -> Result<Session, SessionError> {
        if !self.auth.can_manage_sessions() {
            return Err(SessionError::Forbidden);
        }
        let duration = duration_minutes.unwrap_or(self.config.default_duration_minutes);
        if duration < 1 {
            return Err(SessionError::InvalidDuration);
        }

        let mut slot = self.slot.lock().await;
        if slot.is_active() {
            return Err(SessionError::AlreadyActive);
        }

        let session = self.backend.create_session(class_id, duration).await?;
        let roster = self.backend.get_class_roster(class_id).await?;
        info!(
            "session {} started for class {} ({} enrolled, ends {})",
            session.id,
            class_id,
            roster.len(),
            session.end_time
        );

        *slot = SessionSlot::Active(ActiveAttendance {
            session: session.clone(),
            roster,
            ledger: Arc::new(Mutex::new(AttendanceLedger::new(session.id))),
        });
        drop(slot);

        self.spawn_clock(session.end_time);
        let _ = self.events.send(EngineEvent::SessionStarted {
            session: session.clone(),
        });
        Ok(session)
    }

    /// Re-attach to a session that is still ongoing (the teacher navigated
    /// away and back). Stored logs seed the ledger; if the scheduled end
    /// already passed, the clock fires on its first tick.
    pub async fn resume_session(&self, session_id: SessionId) -> Result<Session, SessionError> {
        if !self.auth.can_manage_sessions() {
            return Err(SessionError::Forbidden);
        }

        let mut slot = self.slot.lock().await;
        if slot.is_active() {
            return Err(SessionError::AlreadyActive);
        }

        let detail = self.backend.get_session(session_id).await?;
        if detail.session.is_ended() {
            return Err(SessionError::AlreadyEnded(session_id));
        }

        let roster = self
            .backend
            .get_class_roster(detail.session.class_id)
            .await?;
        let mut ledger = AttendanceLedger::new(session_id);
        ledger.seed(detail.logs);
        info!(
            "resumed session {} for class {}",
            session_id, detail.session.class_id
        );

        let session = detail.session;
        *slot = SessionSlot::Active(ActiveAttendance {
            session: session.clone(),
            roster,
            ledger: Arc::new(Mutex::new(ledger)),
        });
        drop(slot);

        self.spawn_clock(session.end_time);
        let _ = self.events.send(EngineEvent::SessionStarted {
            session: session.clone(),
        });
        Ok(session)
    }

    /// Start polling the given frame source. The device must be fresh:
    /// a still-running poller means an unreleased camera, which is refused
    /// rather than doubled up.
    pub async fn start_camera(&self, source: Box<dyn FrameSource>) -> Result<(), SessionError> {
        if !self.auth.can_manage_sessions() {
            return Err(SessionError::Forbidden);
        }

        let slot = self.slot.lock().await;
        let active = match &*slot {
            SessionSlot::Active(active) => active,
            _ => return Err(SessionError::NoActiveSession),
        };
        let shared = PollerShared {
            session_id: active.session.id,
            backend: self.backend.clone(),
            ledger: active.ledger.clone(),
            events: self.events.clone(),
        };
        drop(slot);

        let mut poller = self.poller.lock().await;
        if poller.is_active() {
            return Err(SessionError::CameraActive);
        }
        let sampler = Sampler::new(self.config.jpeg_quality, self.config.scene_change_threshold);
        poller
            .start(
                shared,
                source,
                sampler,
                Duration::from_secs(self.config.poll_interval_secs),
                Duration::from_secs(self.config.capture_timeout_secs),
            )
            .map_err(internal)
    }

    /// Open the configured V4L2 device and start polling it.
    #[cfg(target_os = "linux")]
    pub async fn start_default_camera(&self) -> Result<(), SessionError> {
        let camera = crate::capture::Camera::open(&self.config.camera_device)?;
        self.start_camera(Box::new(camera)).await
    }

    /// Stop polling and release the camera. Safe to call at any time; an
    /// in-flight recognition response is discarded on arrival.
    pub async fn stop_camera(&self) -> Result<(), SessionError> {
        self.poller.lock().await.stop().await.map_err(internal)
    }

    /// Teacher-initiated end.
    pub async fn end_session(&self) -> Result<Session, SessionError> {
        if !self.auth.can_manage_sessions() {
            return Err(SessionError::Forbidden);
        }
        self.end_internal(EndReason::Manual).await
    }

    /// The one `ongoing -> ended` transition, shared by the manual path
    /// and clock expiry. Idempotent: ending an ended session returns it
    /// again without side effects.
    async fn end_internal(&self, reason: EndReason) -> Result<Session, SessionError> {
        // Recognition stops first so no response lands mid-transition.
        self.poller.lock().await.stop().await.map_err(internal)?;

        let mut slot = self.slot.lock().await;
        match slot.take_for_end() {
            EndDecision::NoSession => Err(SessionError::NoActiveSession),
            EndDecision::AlreadyEnded(session) => {
                debug!("end requested for already-ended session {}", session.id);
                Ok(session)
            }
            EndDecision::End(active) => {
                active.ledger.lock().await.freeze();
                match self.backend.end_session(active.session.id).await {
                    Ok(ended) => {
                        *slot = SessionSlot::Ended(ended.clone());
                        drop(slot);
                        self.cancel_clock();
                        info!("session {} ended ({})", ended.id, reason_label(reason));
                        let _ = self.events.send(EngineEvent::SessionEnded {
                            session: ended.clone(),
                            reason,
                        });
                        Ok(ended)
                    }
                    Err(err) => {
                        // Keep the session active for a retry. The ledger
                        // stays frozen and the poller stopped, so no
                        // automatic mutation slips in meanwhile.
                        *slot = SessionSlot::Active(active);
                        Err(err.into())
                    }
                }
            }
        }
    }

    /// Record a teacher correction for `user_id` in the current (or just
    /// ended) session. The override is timestamped at issue time, so a
    /// recognition response still in flight cannot clobber it.
    pub async fn manual_override(
        &self,
        user_id: UserId,
        status: AttendanceStatus,
    ) -> Result<AttendanceLog, SessionError> {
        if !self.auth.can_manage_sessions() {
            return Err(SessionError::Forbidden);
        }
        let issued_at = Utc::now();

        let (session_id, ledger) = {
            let slot = self.slot.lock().await;
            match &*slot {
                SessionSlot::Idle => return Err(SessionError::NoActiveSession),
                SessionSlot::Active(active) => {
                    (active.session.id, Some(active.ledger.clone()))
                }
                SessionSlot::Ended(session) => (session.id, None),
            }
        };

        let log = self
            .backend
            .set_attendance_status(session_id, user_id, status)
            .await?;

        if let Some(ledger) = ledger {
            match ledger.lock().await.on_manual_override(log.clone(), issued_at) {
                Ok(()) => {}
                Err(LedgerError::Superseded) => {
                    debug!("override for user {user_id} superseded by a newer correction");
                }
                Err(err) => error!("override for user {user_id} not recorded locally: {err}"),
            }
        }
        info!(
            "user {} manually marked {} in session {}",
            user_id,
            status.as_str(),
            session_id
        );
        Ok(log)
    }

    pub async fn phase(&self) -> SessionPhase {
        self.slot.lock().await.phase()
    }

    pub async fn current_session(&self) -> Option<Session> {
        match &*self.slot.lock().await {
            SessionSlot::Idle => None,
            SessionSlot::Active(active) => Some(active.session.clone()),
            SessionSlot::Ended(session) => Some(session.clone()),
        }
    }

    pub async fn roster(&self) -> Vec<Student> {
        match &*self.slot.lock().await {
            SessionSlot::Active(active) => active.roster.clone(),
            _ => Vec::new(),
        }
    }

    /// The ledger's current one-log-per-student view, while a session is
    /// active.
    pub async fn ledger_snapshot(&self) -> Option<HashMap<UserId, AttendanceLog>> {
        match &*self.slot.lock().await {
            SessionSlot::Active(active) => Some(active.ledger.lock().await.snapshot()),
            _ => None,
        }
    }

    pub async fn camera_phase(&self) -> PollerPhase {
        self.poller.lock().await.phase()
    }

    /// Past and present sessions of a class, each with the status a reader
    /// should display (`expired` for overrun ongoing sessions).
    pub async fn class_history(
        &self,
        class_id: ClassId,
    ) -> Result<Vec<(Session, DisplayStatus)>, SessionError> {
        let sessions = self.backend.list_class_sessions(class_id).await?;
        let now = Utc::now();
        Ok(sessions
            .into_iter()
            .map(|session| {
                let display = session.display_status(now);
                (session, display)
            })
            .collect())
    }

    fn spawn_clock(&self, end_time: DateTime<Utc>) {
        let token = CancellationToken::new();
        {
            let mut guard = self.clock_cancel.lock().unwrap();
            if let Some(previous) = guard.replace(token.clone()) {
                previous.cancel();
            }
        }

        let controller = self.clone();
        tokio::spawn(async move {
            let mut clock = SessionClock::new(end_time);
            let mut ticker = tokio::time::interval(Duration::from_secs(1));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let tick = clock.tick(Utc::now());
                        let _ = controller.events.send(EngineEvent::CountdownTick {
                            remaining: tick.remaining,
                        });
                        if tick.expired_now {
                            info!("session clock reached the scheduled end");
                            match controller.end_internal(EndReason::Expired).await {
                                Ok(_) | Err(SessionError::NoActiveSession) => {}
                                Err(err) => error!("failed to end expired session: {err}"),
                            }
                            break;
                        }
                    }
                    _ = token.cancelled() => break,
                }
            }
        });
    }

    fn cancel_clock(&self) {
        if let Some(token) = self.clock_cancel.lock().unwrap().take() {
            token.cancel();
        }
    }
}

fn reason_label(reason: EndReason) -> &'static str {
    match reason {
        EndReason::Manual => "ended by teacher",
        EndReason::Expired => "scheduled end reached",
    }
}
