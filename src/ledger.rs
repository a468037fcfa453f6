use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::debug;
use thiserror::Error;

use crate::models::{AttendanceLog, SessionId, UserId};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// The session has ended; automatic recognition can no longer mutate
    /// the ledger. Manual corrections are unaffected.
    #[error("ledger is frozen; automatic recognition is over")]
    Frozen,
    #[error("log belongs to session {got}, this ledger tracks session {expected}")]
    SessionMismatch { expected: SessionId, got: SessionId },
    /// A newer entry (by event-issue time) already covers this student.
    /// The caller's mutation is stale and must not clobber it.
    #[error("a newer entry already exists for this student")]
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntrySource {
    Auto,
    Manual,
}

#[derive(Debug, Clone)]
struct LedgerEntry {
    log: AttendanceLog,
    source: EntrySource,
    /// Logical time: when the mutation was issued (frame captured, override
    /// clicked), not when its response arrived. Conflicts resolve on this.
    issued_at: DateTime<Utc>,
}

/// In-memory source of truth for the active session: one authoritative
/// attendance log per enrolled student.
///
/// Keyed by student, so the one-log-per-student invariant holds by
/// construction; the interesting part is deciding which mutation wins.
pub struct AttendanceLedger {
    session_id: SessionId,
    entries: HashMap<UserId, LedgerEntry>,
    frozen: bool,
}

impl AttendanceLedger {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            entries: HashMap::new(),
            frozen: false,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Load logs already stored for this session (resuming an ongoing
    /// session). Stored logs enter as automatic entries timed by their own
    /// timestamps, so a later manual override still wins.
    pub fn seed(&mut self, logs: impl IntoIterator<Item = AttendanceLog>) {
        for log in logs {
            if log.session_id != self.session_id {
                debug!(
                    "ignoring seeded log {} from session {}",
                    log.id, log.session_id
                );
                continue;
            }
            let issued_at = log.timestamp;
            self.entries.insert(
                log.user_id,
                LedgerEntry {
                    log,
                    source: EntrySource::Auto,
                    issued_at,
                },
            );
        }
    }

    /// Upsert from a recognition match. Idempotent: re-recognizing a
    /// student refreshes the entry instead of duplicating it. Rejected when
    /// frozen, or when a newer entry (e.g. a manual correction issued after
    /// this frame was captured) is already in place.
    pub fn on_recognized(
        &mut self,
        log: AttendanceLog,
        issued_at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        if self.frozen {
            return Err(LedgerError::Frozen);
        }
        self.check_session(&log)?;

        if let Some(existing) = self.entries.get(&log.user_id) {
            let manual_tie = existing.source == EntrySource::Manual
                && existing.issued_at == issued_at;
            if existing.issued_at > issued_at || manual_tie {
                return Err(LedgerError::Superseded);
            }
        }

        self.entries.insert(
            log.user_id,
            LedgerEntry {
                log,
                source: EntrySource::Auto,
                issued_at,
            },
        );
        Ok(())
    }

    /// Teacher-issued correction. Always wins over automatic history and
    /// stays allowed after the freeze; only a manual entry issued later can
    /// supersede it.
    pub fn on_manual_override(
        &mut self,
        log: AttendanceLog,
        issued_at: DateTime<Utc>,
    ) -> Result<(), LedgerError> {
        self.check_session(&log)?;

        if let Some(existing) = self.entries.get(&log.user_id) {
            if existing.source == EntrySource::Manual && existing.issued_at > issued_at {
                return Err(LedgerError::Superseded);
            }
        }

        self.entries.insert(
            log.user_id,
            LedgerEntry {
                log,
                source: EntrySource::Manual,
                issued_at,
            },
        );
        Ok(())
    }

    /// Stop accepting automatic mutations. Called on the `ongoing -> ended`
    /// transition.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Current authoritative log per student. Exactly one per student who
    /// has any entry at all.
    pub fn snapshot(&self) -> HashMap<UserId, AttendanceLog> {
        self.entries
            .iter()
            .map(|(user_id, entry)| (*user_id, entry.log.clone()))
            .collect()
    }

    pub fn logs(&self) -> Vec<AttendanceLog> {
        self.entries.values().map(|entry| entry.log.clone()).collect()
    }

    pub fn source_of(&self, user_id: UserId) -> Option<EntrySource> {
        self.entries.get(&user_id).map(|entry| entry.source)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn check_session(&self, log: &AttendanceLog) -> Result<(), LedgerError> {
        if log.session_id != self.session_id {
            return Err(LedgerError::SessionMismatch {
                expected: self.session_id,
                got: log.session_id,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone, Utc};

    use super::*;
    use crate::models::AttendanceStatus;

    const SESSION: SessionId = 9;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap() + Duration::seconds(seconds)
    }

    fn log(user_id: UserId, status: AttendanceStatus, issued: DateTime<Utc>) -> AttendanceLog {
        AttendanceLog {
            id: user_id * 100,
            session_id: SESSION,
            user_id,
            status,
            timestamp: issued,
        }
    }

    #[test]
    fn one_log_per_student_after_any_sequence() {
        let mut ledger = AttendanceLedger::new(SESSION);
        ledger
            .on_recognized(log(1, AttendanceStatus::Present, at(0)), at(0))
            .unwrap();
        ledger
            .on_recognized(log(1, AttendanceStatus::Present, at(3)), at(3))
            .unwrap();
        ledger
            .on_manual_override(log(1, AttendanceStatus::Absent, at(5)), at(5))
            .unwrap();
        ledger
            .on_recognized(log(1, AttendanceStatus::Present, at(9)), at(9))
            .unwrap();

        assert_eq!(ledger.snapshot().len(), 1);
    }

    #[test]
    fn repeat_recognition_refreshes_timestamp() {
        let mut ledger = AttendanceLedger::new(SESSION);
        ledger
            .on_recognized(log(1, AttendanceStatus::Present, at(0)), at(0))
            .unwrap();
        ledger
            .on_recognized(log(1, AttendanceStatus::Present, at(6)), at(6))
            .unwrap();

        let snapshot = ledger.snapshot();
        assert_eq!(snapshot[&1].status, AttendanceStatus::Present);
        assert_eq!(snapshot[&1].timestamp, at(6));
    }

    #[test]
    fn manual_override_wins_in_either_arrival_order() {
        // Auto issued at t=0, manual issued at t=5; manual must end up
        // current no matter which response lands first.
        let auto = log(1, AttendanceStatus::Present, at(0));
        let manual = log(1, AttendanceStatus::Absent, at(5));

        let mut in_order = AttendanceLedger::new(SESSION);
        in_order.on_recognized(auto.clone(), at(0)).unwrap();
        in_order.on_manual_override(manual.clone(), at(5)).unwrap();
        assert_eq!(in_order.snapshot()[&1].status, AttendanceStatus::Absent);

        let mut reversed = AttendanceLedger::new(SESSION);
        reversed.on_manual_override(manual, at(5)).unwrap();
        let stale = reversed.on_recognized(auto, at(0));
        assert_eq!(stale, Err(LedgerError::Superseded));
        assert_eq!(reversed.snapshot()[&1].status, AttendanceStatus::Absent);
    }

    #[test]
    fn newer_recognition_can_supersede_older_manual_entry() {
        let mut ledger = AttendanceLedger::new(SESSION);
        ledger
            .on_manual_override(log(1, AttendanceStatus::Absent, at(5)), at(5))
            .unwrap();
        ledger
            .on_recognized(log(1, AttendanceStatus::Present, at(20)), at(20))
            .unwrap();
        assert_eq!(ledger.snapshot()[&1].status, AttendanceStatus::Present);
    }

    #[test]
    fn freeze_blocks_recognition_but_not_corrections() {
        let mut ledger = AttendanceLedger::new(SESSION);
        ledger.freeze();

        let rejected = ledger.on_recognized(log(1, AttendanceStatus::Present, at(0)), at(0));
        assert_eq!(rejected, Err(LedgerError::Frozen));

        ledger
            .on_manual_override(log(1, AttendanceStatus::Present, at(2)), at(2))
            .unwrap();
        assert_eq!(ledger.snapshot()[&1].status, AttendanceStatus::Present);
        assert_eq!(ledger.source_of(1), Some(EntrySource::Manual));
    }

    #[test]
    fn logs_from_other_sessions_are_rejected() {
        let mut ledger = AttendanceLedger::new(SESSION);
        let mut foreign = log(1, AttendanceStatus::Present, at(0));
        foreign.session_id = SESSION + 1;

        let result = ledger.on_recognized(foreign, at(0));
        assert!(matches!(result, Err(LedgerError::SessionMismatch { .. })));
        assert!(ledger.is_empty());
    }

    #[test]
    fn seeding_loads_stored_logs_once() {
        let mut ledger = AttendanceLedger::new(SESSION);
        ledger.seed(vec![
            log(1, AttendanceStatus::Present, at(0)),
            log(2, AttendanceStatus::Absent, at(1)),
        ]);
        assert_eq!(ledger.snapshot().len(), 2);

        // A later manual correction still beats the seeded entry.
        ledger
            .on_manual_override(log(1, AttendanceStatus::Absent, at(10)), at(10))
            .unwrap();
        assert_eq!(ledger.snapshot()[&1].status, AttendanceStatus::Absent);
    }
}
