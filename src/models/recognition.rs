use chrono::{DateTime, Utc};

use super::AttendanceLog;

/// One recognition poll's result. Transient: consumed by the ledger and the
/// event stream, never persisted.
#[derive(Debug, Clone)]
pub struct RecognitionEvent {
    /// When the frame was captured, not when the response arrived. Ledger
    /// ordering is decided by this value.
    pub captured_at: DateTime<Utc>,
    pub outcome: RecognitionOutcome,
}

#[derive(Debug, Clone)]
pub enum RecognitionOutcome {
    /// The service matched exactly one enrolled face and upserted the log.
    Matched {
        log: AttendanceLog,
        confidence: Option<f32>,
    },
    /// No face, or no enrolled face, in the frame. The expected outcome on
    /// most polls; not a fault.
    NoMatch,
    /// Network or service failure for this poll only. Polling continues.
    TransientError { reason: String },
}
