use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{AttendanceLog, ClassId, SessionId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Ongoing,
    Ended,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Ongoing => "ongoing",
            SessionStatus::Ended => "ended",
        }
    }
}

/// What a reader should display for a session, as opposed to what is stored.
///
/// A session whose scheduled end has passed without an explicit end
/// transition stays `ongoing` in the backend but must never be shown as
/// such.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DisplayStatus {
    Ongoing,
    Expired,
    Ended,
}

/// A bounded-time attendance-taking window for one class.
///
/// `end_time` is fixed at creation (`start_time + requested duration`) and
/// only `status` ever changes afterwards, through the single
/// `ongoing -> ended` transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub class_id: ClassId,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub status: SessionStatus,
}

impl Session {
    pub fn is_ended(&self) -> bool {
        self.status == SessionStatus::Ended
    }

    /// Status for display at `now`, applying the expired-but-not-ended rule.
    pub fn display_status(&self, now: DateTime<Utc>) -> DisplayStatus {
        match self.status {
            SessionStatus::Ended => DisplayStatus::Ended,
            SessionStatus::Ongoing if now > self.end_time => DisplayStatus::Expired,
            SessionStatus::Ongoing => DisplayStatus::Ongoing,
        }
    }
}

/// Session detail as returned by the backend, logs included.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionWithLogs {
    #[serde(flatten)]
    pub session: Session,
    #[serde(default)]
    pub logs: Vec<AttendanceLog>,
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn session_ending_at(end: DateTime<Utc>, status: SessionStatus) -> Session {
        Session {
            id: 1,
            class_id: 10,
            start_time: end - chrono::Duration::minutes(45),
            end_time: end,
            status,
        }
    }

    #[test]
    fn ongoing_before_end_time_displays_ongoing() {
        let end = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let session = session_ending_at(end, SessionStatus::Ongoing);
        let now = end - chrono::Duration::seconds(1);
        assert_eq!(session.display_status(now), DisplayStatus::Ongoing);
    }

    #[test]
    fn ongoing_past_end_time_displays_expired() {
        let end = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let session = session_ending_at(end, SessionStatus::Ongoing);
        let now = end + chrono::Duration::seconds(1);
        assert_eq!(session.display_status(now), DisplayStatus::Expired);
    }

    #[test]
    fn ended_always_displays_ended() {
        let end = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let session = session_ending_at(end, SessionStatus::Ended);
        let now = end + chrono::Duration::hours(2);
        assert_eq!(session.display_status(now), DisplayStatus::Ended);
    }

    #[test]
    fn session_with_logs_tolerates_missing_logs_field() {
        let json = r#"{
            "id": 5,
            "class_id": 2,
            "start_time": "2026-03-02T08:00:00Z",
            "end_time": "2026-03-02T08:45:00Z",
            "status": "ongoing"
        }"#;
        let detail: SessionWithLogs = serde_json::from_str(json).unwrap();
        assert!(detail.logs.is_empty());
        assert_eq!(detail.session.id, 5);
    }
}
