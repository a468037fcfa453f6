mod attendance;
mod recognition;
mod session;
mod student;

pub use attendance::{AttendanceLog, AttendanceStatus, StatusParseError};
pub use recognition::{RecognitionEvent, RecognitionOutcome};
pub use session::{DisplayStatus, Session, SessionStatus, SessionWithLogs};
pub use student::Student;

/// Identifiers assigned by the backend. They are opaque to the engine.
pub type UserId = i64;
pub type ClassId = i64;
pub type SessionId = i64;
pub type LogId = i64;
