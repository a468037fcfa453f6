mod http;

pub use http::HttpBackend;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{
    AttendanceLog, AttendanceStatus, ClassId, LogId, Session, SessionId, SessionWithLogs, Student,
    UserId,
};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("backend returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// Outcome of one recognition call.
///
/// `NoMatch` is the well-defined "nothing to record" reply (a 404 on the
/// wire), distinct from `ApiError` which covers genuine failures.
#[derive(Debug, Clone)]
pub enum RecognitionReply {
    Matched {
        log: AttendanceLog,
        /// Match confidence, when the service reports one.
        confidence: Option<f32>,
    },
    NoMatch,
}

/// The persistence/recognition service the engine is a client of.
///
/// Transport and auth are hidden behind this seam; tests substitute an
/// in-memory fake.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Open a new attendance window; the returned session is `ongoing` with
    /// `end_time = now + duration_minutes`.
    async fn create_session(
        &self,
        class_id: ClassId,
        duration_minutes: i64,
    ) -> Result<Session, ApiError>;

    /// Idempotent: ending an ended session returns it unchanged.
    async fn end_session(&self, session_id: SessionId) -> Result<Session, ApiError>;

    async fn get_session(&self, session_id: SessionId) -> Result<SessionWithLogs, ApiError>;

    async fn list_class_sessions(&self, class_id: ClassId) -> Result<Vec<Session>, ApiError>;

    /// Submit one JPEG frame for recognition. The backend creates or
    /// refreshes the matched student's log itself; the reply carries the
    /// resulting record.
    async fn recognize_face(
        &self,
        session_id: SessionId,
        jpeg: &[u8],
    ) -> Result<RecognitionReply, ApiError>;

    /// Create-or-update the log for `(session_id, user_id)`.
    async fn set_attendance_status(
        &self,
        session_id: SessionId,
        user_id: UserId,
        status: AttendanceStatus,
    ) -> Result<AttendanceLog, ApiError>;

    async fn set_log_status(
        &self,
        log_id: LogId,
        status: AttendanceStatus,
    ) -> Result<AttendanceLog, ApiError>;

    async fn get_class_roster(&self, class_id: ClassId) -> Result<Vec<Student>, ApiError>;
}
