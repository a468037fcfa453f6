use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use log::info;
use thiserror::Error;

use crate::api::{ApiError, Backend};
use crate::auth::AuthContext;
use crate::models::{
    AttendanceLog, AttendanceStatus, DisplayStatus, Session, SessionId, Student, UserId,
};

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("only teachers may correct attendance")]
    Forbidden,
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// A roster member together with their stored log.
#[derive(Debug, Clone)]
pub struct ReportEntry {
    pub student: Student,
    pub log: AttendanceLog,
}

/// The reconciled view of an ended (or still-running) session: every roster
/// member in exactly one bucket.
#[derive(Debug, Clone, Default)]
pub struct AttendanceReport {
    /// Recognized or manually marked present (legacy `late` records land
    /// here via status normalization).
    pub present: Vec<ReportEntry>,
    /// A stored log explicitly says absent.
    pub manually_absent: Vec<ReportEntry>,
    /// No stored log at all; absent by default.
    pub never_seen: Vec<Student>,
}

impl AttendanceReport {
    /// Summary figure: everyone not in the present bucket.
    pub fn total_absent(&self) -> usize {
        self.manually_absent.len() + self.never_seen.len()
    }

    pub fn roster_len(&self) -> usize {
        self.present.len() + self.total_absent()
    }
}

/// Partition the roster against the session's stored logs.
///
/// Pure: same inputs, same buckets. Logs for students outside the roster
/// are ignored rather than invented into membership.
pub fn partition(roster: &[Student], logs: &[AttendanceLog]) -> AttendanceReport {
    let by_user: HashMap<UserId, &AttendanceLog> =
        logs.iter().map(|log| (log.user_id, log)).collect();

    let mut report = AttendanceReport::default();
    for student in roster {
        match by_user.get(&student.id) {
            Some(log) => {
                let entry = ReportEntry {
                    student: student.clone(),
                    log: (*log).clone(),
                };
                match log.status {
                    AttendanceStatus::Present => report.present.push(entry),
                    AttendanceStatus::Absent => report.manually_absent.push(entry),
                }
            }
            None => report.never_seen.push(student.clone()),
        }
    }
    report
}

/// Report for one session, ready for display and correction.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub session: Session,
    pub display_status: DisplayStatus,
    pub report: AttendanceReport,
}

/// Loads reports and applies teacher corrections, re-partitioning after
/// every write so no member can sit in two buckets.
pub struct ReportReconciler {
    backend: Arc<dyn Backend>,
    auth: AuthContext,
}

impl ReportReconciler {
    pub fn new(backend: Arc<dyn Backend>, auth: AuthContext) -> Self {
        Self { backend, auth }
    }

    pub async fn load(&self, session_id: SessionId) -> Result<SessionReport, ReportError> {
        let detail = self.backend.get_session(session_id).await?;
        let roster = self
            .backend
            .get_class_roster(detail.session.class_id)
            .await?;
        let report = partition(&roster, &detail.logs);
        Ok(SessionReport {
            display_status: detail.session.display_status(Utc::now()),
            session: detail.session,
            report,
        })
    }

    /// Correct one member's status: updates their existing log in place, or
    /// creates the single missing one for a never-seen member, then
    /// reloads and re-partitions.
    pub async fn correct(
        &self,
        session_id: SessionId,
        user_id: UserId,
        status: AttendanceStatus,
    ) -> Result<SessionReport, ReportError> {
        if !self.auth.can_manage_sessions() {
            return Err(ReportError::Forbidden);
        }

        let detail = self.backend.get_session(session_id).await?;
        let existing = detail.logs.iter().find(|log| log.user_id == user_id);
        let updated = match existing {
            Some(log) => self.backend.set_log_status(log.id, status).await?,
            None => {
                self.backend
                    .set_attendance_status(session_id, user_id, status)
                    .await?
            }
        };
        info!(
            "corrected attendance of user {} in session {} to {}",
            user_id,
            session_id,
            updated.status.as_str()
        );

        self.load(session_id).await
    }
}
