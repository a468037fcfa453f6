use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{LogId, SessionId, UserId};

#[derive(Debug, Error)]
#[error("invalid attendance status '{0}' (expected 'present' or 'absent')")]
pub struct StatusParseError(String);

/// Per-student attendance outcome for a session.
///
/// The wire may still carry the retired `"late"` value in old records; it
/// deserializes to `Present`. There is no third variant anywhere past the
/// boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AttendanceStatus {
    Present,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttendanceStatus::Present => "present",
            AttendanceStatus::Absent => "absent",
        }
    }
}

impl TryFrom<String> for AttendanceStatus {
    type Error = StatusParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "present" | "late" => Ok(AttendanceStatus::Present),
            "absent" => Ok(AttendanceStatus::Absent),
            _ => Err(StatusParseError(value)),
        }
    }
}

impl From<AttendanceStatus> for String {
    fn from(status: AttendanceStatus) -> Self {
        status.as_str().to_string()
    }
}

/// Strict form used for teacher-entered corrections: `"late"` is not
/// accepted as input, only tolerated in stored data.
impl FromStr for AttendanceStatus {
    type Err = StatusParseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "present" => Ok(AttendanceStatus::Present),
            "absent" => Ok(AttendanceStatus::Absent),
            _ => Err(StatusParseError(value.to_string())),
        }
    }
}

/// The durable per-student, per-session attendance record.
///
/// At most one exists per `(session_id, user_id)` pair; the backend upserts
/// and so does the in-memory ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceLog {
    pub id: LogId,
    pub session_id: SessionId,
    pub user_id: UserId,
    pub status: AttendanceStatus,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_late_as_present() {
        let status: AttendanceStatus = serde_json::from_str("\"late\"").unwrap();
        assert_eq!(status, AttendanceStatus::Present);
    }

    #[test]
    fn deserializes_present_and_absent() {
        let present: AttendanceStatus = serde_json::from_str("\"present\"").unwrap();
        let absent: AttendanceStatus = serde_json::from_str("\"absent\"").unwrap();
        assert_eq!(present, AttendanceStatus::Present);
        assert_eq!(absent, AttendanceStatus::Absent);
    }

    #[test]
    fn rejects_unknown_status_on_the_wire() {
        let result: Result<AttendanceStatus, _> = serde_json::from_str("\"excused\"");
        assert!(result.is_err());
    }

    #[test]
    fn manual_input_rejects_late() {
        assert!("late".parse::<AttendanceStatus>().is_err());
        assert_eq!(
            "present".parse::<AttendanceStatus>().unwrap(),
            AttendanceStatus::Present
        );
    }

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&AttendanceStatus::Absent).unwrap();
        assert_eq!(json, "\"absent\"");
    }

    #[test]
    fn log_round_trips_from_backend_shape() {
        let json = r#"{
            "id": 7,
            "session_id": 3,
            "user_id": 42,
            "status": "late",
            "timestamp": "2026-03-02T08:15:00Z",
            "user": {"id": 42, "full_name": "An Tran", "student_code": "SV042"}
        }"#;
        let log: AttendanceLog = serde_json::from_str(json).unwrap();
        assert_eq!(log.user_id, 42);
        assert_eq!(log.status, AttendanceStatus::Present);
    }
}
