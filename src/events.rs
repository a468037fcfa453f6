use serde::Serialize;

use crate::clock::Countdown;
use crate::models::{AttendanceLog, Session};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EndReason {
    /// Teacher pressed "end session".
    Manual,
    /// The session clock reached the scheduled end.
    Expired,
}

/// Engine-to-UI notifications, broadcast as they happen.
///
/// The engine keeps emitting even when nobody listens; a UI layer
/// subscribes and renders whatever subset it cares about.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum EngineEvent {
    SessionStarted { session: Session },
    /// A student was matched on the live feed; their log was created or
    /// refreshed.
    Recognized {
        log: AttendanceLog,
        confidence: Option<f32>,
    },
    /// Camera is live, nothing matched. Sent once when entering this
    /// state, not on every empty poll.
    Watching,
    /// One poll failed; polling continues.
    PollFailed { reason: String },
    CountdownTick { remaining: Countdown },
    SessionEnded { session: Session, reason: EndReason },
}
