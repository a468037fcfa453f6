use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::ledger::AttendanceLedger;
use crate::models::{Session, Student};

/// Lifecycle phase as seen by callers.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Idle,
    Ongoing,
    Ended,
}

/// Everything owned by the running session's view.
pub(crate) struct ActiveAttendance {
    pub session: Session,
    pub roster: Vec<Student>,
    pub ledger: Arc<Mutex<AttendanceLedger>>,
}

/// The controller's single session slot. A new session may only begin from
/// `Idle` or `Ended`; the `Ended` variant keeps the last session around so
/// a repeated end request can answer with it instead of failing.
pub(crate) enum SessionSlot {
    Idle,
    Active(ActiveAttendance),
    Ended(Session),
}

pub(crate) enum EndDecision {
    NoSession,
    AlreadyEnded(Session),
    End(ActiveAttendance),
}

impl SessionSlot {
    pub fn phase(&self) -> SessionPhase {
        match self {
            SessionSlot::Idle => SessionPhase::Idle,
            SessionSlot::Active(_) => SessionPhase::Ongoing,
            SessionSlot::Ended(_) => SessionPhase::Ended,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, SessionSlot::Active(_))
    }

    /// Decide what an end request should do. On `End`, the slot is left
    /// `Idle` until the caller commits the transition (or restores the
    /// active state if the backend call fails).
    pub fn take_for_end(&mut self) -> EndDecision {
        match std::mem::replace(self, SessionSlot::Idle) {
            SessionSlot::Idle => EndDecision::NoSession,
            SessionSlot::Ended(session) => {
                *self = SessionSlot::Ended(session.clone());
                EndDecision::AlreadyEnded(session)
            }
            SessionSlot::Active(active) => EndDecision::End(active),
        }
    }
}
