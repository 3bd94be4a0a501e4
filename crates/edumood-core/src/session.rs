//! Session context: the append-only emotion log for one viewing session.
//!
//! Frame handlers append and report readers snapshot concurrently, so the log
//! sits behind an `RwLock`. Report computation always runs on a snapshot,
//! outside the lock.

use crate::report::{self, Report};
use crate::types::EmotionRecord;
use chrono::{DateTime, Local};
use serde::Serialize;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

struct SessionState {
    id: Uuid,
    started_at: DateTime<Local>,
    records: Vec<EmotionRecord>,
}

impl SessionState {
    fn fresh() -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Local::now(),
            records: Vec::new(),
        }
    }
}

/// Session metadata without the records.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionInfo {
    pub id: Uuid,
    pub started_at: DateTime<Local>,
    pub records: usize,
}

/// Point-in-time copy of the session log.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSnapshot {
    pub id: Uuid,
    pub started_at: DateTime<Local>,
    pub records: Vec<EmotionRecord>,
}

/// One viewing session, shared by the frame handler and the report readers.
pub struct Session {
    state: RwLock<SessionState>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// Start a session with an empty log.
    pub fn new() -> Self {
        let state = SessionState::fresh();
        tracing::info!(session = %state.id, "session started");
        Self {
            state: RwLock::new(state),
        }
    }

    // The log is append-only, so state behind a poisoned lock is still valid.
    fn read(&self) -> RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn append(&self, record: EmotionRecord) {
        let mut state = self.write();
        state.records.push(record);
        tracing::debug!(session = %state.id, records = state.records.len(), "record appended");
    }

    pub fn len(&self) -> usize {
        self.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn info(&self) -> SessionInfo {
        let state = self.read();
        SessionInfo {
            id: state.id,
            started_at: state.started_at,
            records: state.records.len(),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.read();
        SessionSnapshot {
            id: state.id,
            started_at: state.started_at,
            records: state.records.clone(),
        }
    }

    /// Build the report from the current log.
    pub fn report(&self) -> Report {
        report::build(&self.snapshot().records)
    }

    /// End the current session and start a fresh one with an empty log.
    pub fn reset(&self) -> SessionInfo {
        let mut state = self.write();
        let previous = std::mem::replace(&mut *state, SessionState::fresh());
        tracing::info!(
            previous = %previous.id,
            discarded = previous.records.len(),
            session = %state.id,
            "session reset"
        );
        SessionInfo {
            id: state.id,
            started_at: state.started_at,
            records: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EmotionCounts;
    use chrono::NaiveDate;
    use std::sync::Arc;

    fn record(sec: u32, happy: u32) -> EmotionRecord {
        EmotionRecord {
            recorded_at: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap().and_hms_opt(8, 0, sec).unwrap(),
            counts: EmotionCounts { happy, ..Default::default() },
        }
    }

    #[test]
    fn test_new_session_is_empty() {
        let session = Session::new();
        assert!(session.is_empty());
        assert!(session.snapshot().records.is_empty());
    }

    #[test]
    fn test_append_preserves_order() {
        let session = Session::new();
        session.append(record(2, 1));
        session.append(record(1, 2));
        let snap = session.snapshot();
        assert_eq!(snap.records, vec![record(2, 1), record(1, 2)]);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let session = Session::new();
        session.append(record(0, 1));
        let snap = session.snapshot();
        session.append(record(1, 1));
        assert_eq!(snap.records.len(), 1);
        assert_eq!(session.len(), 2);
    }

    #[test]
    fn test_reset_clears_and_renews_id() {
        let session = Session::new();
        let before = session.info();
        session.append(record(0, 3));

        let after = session.reset();
        assert_ne!(before.id, after.id);
        assert_eq!(after.records, 0);
        assert!(session.is_empty());
    }

    #[test]
    fn test_concurrent_appends_and_reads() {
        let session = Arc::new(Session::new());
        let writers: Vec<_> = (0..4)
            .map(|_| {
                let session = Arc::clone(&session);
                std::thread::spawn(move || {
                    for i in 0..50 {
                        session.append(record(i % 60, 1));
                        let _ = session.report();
                    }
                })
            })
            .collect();
        for w in writers {
            w.join().unwrap();
        }
        assert_eq!(session.len(), 200);
    }
}
