//! The most recent counterable attack on each target.
//!
//! A target holds at most one record; a new attack overwrites the previous
//! one. A record stays counterable until `recorded + window`. The deadline
//! is checked by every read, so the background expiry task only frees
//! memory. It captures the record id and never removes a newer record that
//! replaced the one it was armed for.
//!
//! A caller that consumes a record and then fails to act on it can put it
//! back with [`AttackMemory::restore`]. The record keeps its id and its
//! original deadline, and never displaces a newer attack on the same
//! target.

use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::runtime::Handle;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use feud_types::{AttackId, AttackKind, AttackRecord, SubjectId};

use crate::error::AttackMemoryError;

/// Input to [`AttackMemory::record_attack`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAttack {
    /// The participant who lost points.
    pub target: SubjectId,
    /// The participant who caused the loss.
    pub attacker: SubjectId,
    /// How the loss happened.
    pub kind: AttackKind,
    /// Points restored to the target if the attack is countered.
    pub amount_at_risk: i64,
    /// Free-form reason.
    pub reason: String,
    /// How long the attack stays counterable, in milliseconds.
    pub window_ms: u64,
}

impl NewAttack {
    /// Check the attack can be recorded, without recording it.
    pub fn validate(&self) -> Result<(), AttackMemoryError> {
        if self.amount_at_risk <= 0 {
            return Err(AttackMemoryError::InvalidAmount {
                amount: self.amount_at_risk,
            });
        }
        if self.window_ms == 0 {
            return Err(AttackMemoryError::InvalidWindow);
        }
        if self.attacker == self.target {
            return Err(AttackMemoryError::SelfTarget {
                subject: self.attacker.clone(),
            });
        }
        Ok(())
    }
}

/// A record taken out of memory, with the deadline it was stored under.
///
/// Hand it back to [`AttackMemory::restore`] to undo the take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumedAttack {
    record: AttackRecord,
    deadline: Instant,
}

impl ConsumedAttack {
    /// The consumed record.
    pub const fn record(&self) -> &AttackRecord {
        &self.record
    }

    /// Keep the record and give up the option to restore it.
    pub fn into_record(self) -> AttackRecord {
        self.record
    }
}

/// Aborts the expiry task when the record leaves the map.
#[derive(Debug)]
struct ExpiryGuard(AbortHandle);

impl Drop for ExpiryGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

#[derive(Debug)]
struct StoredAttack {
    record: AttackRecord,
    deadline: Instant,
    _expiry: Option<ExpiryGuard>,
}

impl StoredAttack {
    fn is_live(&self, now: Instant) -> bool {
        now < self.deadline
    }
}

type RecordMap = DashMap<SubjectId, StoredAttack>;

/// Keeps the latest attack per target for the counter-defense window.
#[derive(Debug, Default)]
pub struct AttackMemory {
    records: Arc<RecordMap>,
}

impl AttackMemory {
    /// Create an empty memory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an attack, replacing any earlier record for the same target.
    ///
    /// Arms an expiry task when called inside a tokio runtime. Outside one,
    /// the record still expires logically and is freed by
    /// [`sweep_expired`](Self::sweep_expired) or the next read.
    pub fn record_attack(&self, attack: NewAttack) -> Result<AttackRecord, AttackMemoryError> {
        attack.validate()?;

        let record = AttackRecord {
            id: AttackId::new(),
            target: attack.target,
            attacker: attack.attacker,
            kind: attack.kind,
            amount_at_risk: attack.amount_at_risk,
            reason: attack.reason,
            recorded_at: Utc::now(),
            window_ms: attack.window_ms,
        };
        let deadline = Instant::now()
            .checked_add(Duration::from_millis(record.window_ms))
            .ok_or(AttackMemoryError::InvalidWindow)?;

        let expiry = self.arm_expiry(record.target.clone(), record.id, deadline);
        let stored = StoredAttack {
            record: record.clone(),
            deadline,
            _expiry: expiry,
        };

        if let Some(previous) = self.records.insert(record.target.clone(), stored) {
            debug!(
                target_id = %record.target,
                previous_attacker = %previous.record.attacker,
                attacker = %record.attacker,
                "Attack record overwritten"
            );
        }

        debug!(
            target_id = %record.target,
            attacker = %record.attacker,
            kind = ?record.kind,
            amount = record.amount_at_risk,
            window_ms = record.window_ms,
            "Attack recorded"
        );
        Ok(record)
    }

    /// Remove and return the target's record if its window is still open.
    ///
    /// An expired record is treated as absent and freed on the way out.
    pub fn consume_if_present(&self, target: &SubjectId) -> Result<AttackRecord, AttackMemoryError> {
        self.take_if_present(target).map(ConsumedAttack::into_record)
    }

    /// Like [`consume_if_present`](Self::consume_if_present), but keeps what
    /// [`restore`](Self::restore) needs to put the record back.
    pub fn take_if_present(&self, target: &SubjectId) -> Result<ConsumedAttack, AttackMemoryError> {
        let now = Instant::now();

        if let Some((_, stored)) = self.records.remove_if(target, |_, s| s.is_live(now)) {
            debug!(
                target_id = %target,
                attacker = %stored.record.attacker,
                "Attack record consumed"
            );
            return Ok(ConsumedAttack {
                record: stored.record,
                deadline: stored.deadline,
            });
        }

        self.records.remove_if(target, |_, s| !s.is_live(now));
        Err(AttackMemoryError::NotFound {
            target: target.clone(),
        })
    }

    /// Put a consumed record back under its original deadline.
    ///
    /// Returns `false`, and stores nothing, if the window has closed in the
    /// meantime or a live attack on the same target has been recorded since.
    pub fn restore(&self, consumed: ConsumedAttack) -> bool {
        let now = Instant::now();
        if now >= consumed.deadline {
            debug!(target_id = %consumed.record.target, "Attack record expired before restore");
            return false;
        }

        let target = consumed.record.target.clone();
        match self.records.entry(target.clone()) {
            Entry::Occupied(occupied) if occupied.get().is_live(now) => {
                debug!(
                    target_id = %target,
                    attacker = %occupied.get().record.attacker,
                    "Newer attack record kept over restore"
                );
                false
            }
            entry => {
                let expiry = self.arm_expiry(target.clone(), consumed.record.id, consumed.deadline);
                entry.insert(StoredAttack {
                    record: consumed.record,
                    deadline: consumed.deadline,
                    _expiry: expiry,
                });
                debug!(target_id = %target, "Attack record restored");
                true
            }
        }
    }

    /// Time left to counter the target's record. Zero if absent or expired.
    pub fn remaining_window(&self, target: &SubjectId) -> Duration {
        let now = Instant::now();
        self.records
            .get(target)
            .map_or(Duration::ZERO, |s| s.deadline.saturating_duration_since(now))
    }

    /// The target's live record, without consuming it.
    pub fn peek(&self, target: &SubjectId) -> Option<AttackRecord> {
        let now = Instant::now();
        self.records
            .get(target)
            .filter(|s| s.is_live(now))
            .map(|s| s.record.clone())
    }

    /// Free every expired record, returning how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let expired: Vec<SubjectId> = self
            .records
            .iter()
            .filter(|s| !s.is_live(now))
            .map(|s| s.key().clone())
            .collect();

        expired
            .iter()
            .filter(|target| {
                self.records
                    .remove_if(*target, |_, s| !s.is_live(now))
                    .is_some()
            })
            .count()
    }

    /// Number of stored records, expired-but-unfreed ones included.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether no records are stored.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn arm_expiry(&self, target: SubjectId, id: AttackId, deadline: Instant) -> Option<ExpiryGuard> {
        let Ok(runtime) = Handle::try_current() else {
            warn!(target_id = %target, "No tokio runtime; attack record relies on lazy expiry");
            return None;
        };

        let records: Weak<RecordMap> = Arc::downgrade(&self.records);
        let task = runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let Some(records) = records.upgrade() else {
                return;
            };
            if records.remove_if(&target, |_, s| s.record.id == id).is_some() {
                debug!(target_id = %target, "Attack record expired");
            }
        });
        Some(ExpiryGuard(task.abort_handle()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn attack(target: &str, attacker: &str, amount: i64, window_ms: u64) -> NewAttack {
        NewAttack {
            target: SubjectId::new(target),
            attacker: SubjectId::new(attacker),
            kind: AttackKind::Robbery,
            amount_at_risk: amount,
            reason: String::from("robbery"),
            window_ms,
        }
    }

    async fn advance_ms(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        tokio::task::yield_now().await;
    }

    #[tokio::test(start_paused = true)]
    async fn consume_within_window_returns_and_deletes() {
        let memory = AttackMemory::new();
        let target = SubjectId::new("t");
        let recorded = memory.record_attack(attack("t", "a", 30, 1000)).unwrap();

        advance_ms(500).await;
        let consumed = memory.consume_if_present(&target).unwrap();
        assert_eq!(consumed, recorded);
        assert_eq!(consumed.amount_at_risk, 30);

        assert_eq!(
            memory.consume_if_present(&target),
            Err(AttackMemoryError::NotFound { target })
        );
        assert!(memory.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn consume_after_window_is_not_found() {
        let memory = AttackMemory::new();
        let target = SubjectId::new("t");
        memory.record_attack(attack("t", "a", 30, 1000)).unwrap();

        tokio::time::advance(Duration::from_millis(1000)).await;
        assert!(matches!(
            memory.consume_if_present(&target),
            Err(AttackMemoryError::NotFound { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_task_frees_record() {
        let memory = AttackMemory::new();
        memory.record_attack(attack("t", "a", 30, 1000)).unwrap();
        assert_eq!(memory.len(), 1);

        advance_ms(1001).await;
        assert!(memory.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn old_expiry_never_removes_newer_record() {
        let memory = AttackMemory::new();
        let target = SubjectId::new("t");
        memory.record_attack(attack("t", "first", 10, 1000)).unwrap();

        advance_ms(500).await;
        memory.record_attack(attack("t", "second", 20, 1000)).unwrap();

        // Past the first record's deadline, before the second's.
        advance_ms(600).await;
        let live = memory.consume_if_present(&target).unwrap();
        assert_eq!(live.attacker, SubjectId::new("second"));
        assert_eq!(live.amount_at_risk, 20);
    }

    #[tokio::test(start_paused = true)]
    async fn remaining_window_counts_down() {
        let memory = AttackMemory::new();
        let target = SubjectId::new("t");
        assert_eq!(memory.remaining_window(&target), Duration::ZERO);

        memory.record_attack(attack("t", "a", 30, 1000)).unwrap();
        tokio::time::advance(Duration::from_millis(300)).await;
        assert_eq!(memory.remaining_window(&target), Duration::from_millis(700));

        tokio::time::advance(Duration::from_millis(800)).await;
        assert_eq!(memory.remaining_window(&target), Duration::ZERO);
        assert!(memory.peek(&target).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn restored_record_keeps_id_and_deadline() {
        let memory = AttackMemory::new();
        let target = SubjectId::new("t");
        let recorded = memory.record_attack(attack("t", "a", 30, 1000)).unwrap();

        advance_ms(400).await;
        let taken = memory.take_if_present(&target).unwrap();
        assert_eq!(taken.record(), &recorded);
        assert!(memory.peek(&target).is_none());

        assert!(memory.restore(taken));
        assert_eq!(memory.peek(&target), Some(recorded));
        assert_eq!(memory.remaining_window(&target), Duration::from_millis(600));

        advance_ms(601).await;
        assert!(memory.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn restore_never_displaces_newer_attack() {
        let memory = AttackMemory::new();
        let target = SubjectId::new("t");
        memory.record_attack(attack("t", "first", 10, 1000)).unwrap();

        let taken = memory.take_if_present(&target).unwrap();
        memory.record_attack(attack("t", "second", 20, 1000)).unwrap();

        assert!(!memory.restore(taken));
        let live = memory.peek(&target).unwrap();
        assert_eq!(live.attacker, SubjectId::new("second"));
    }

    #[tokio::test(start_paused = true)]
    async fn restore_after_window_stores_nothing() {
        let memory = AttackMemory::new();
        let target = SubjectId::new("t");
        memory.record_attack(attack("t", "a", 30, 1000)).unwrap();

        let taken = memory.take_if_present(&target).unwrap();
        tokio::time::advance(Duration::from_millis(1000)).await;

        assert!(!memory.restore(taken));
        assert!(memory.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn peek_does_not_consume() {
        let memory = AttackMemory::new();
        let target = SubjectId::new("t");
        memory.record_attack(attack("t", "a", 30, 1000)).unwrap();

        assert!(memory.peek(&target).is_some());
        assert!(memory.consume_if_present(&target).is_ok());
    }

    #[test]
    fn without_runtime_records_expire_lazily() {
        let memory = AttackMemory::new();
        memory.record_attack(attack("t", "a", 30, 1)).unwrap();
        std::thread::sleep(Duration::from_millis(5));

        assert_eq!(memory.len(), 1);
        assert_eq!(memory.sweep_expired(), 1);
        assert!(memory.is_empty());
    }

    #[test]
    fn validation_errors() {
        let memory = AttackMemory::new();
        assert_eq!(
            memory.record_attack(attack("t", "a", 0, 1000)),
            Err(AttackMemoryError::InvalidAmount { amount: 0 })
        );
        assert_eq!(
            memory.record_attack(attack("t", "a", 5, 0)),
            Err(AttackMemoryError::InvalidWindow)
        );
        assert!(matches!(
            memory.record_attack(attack("t", "t", 5, 1000)),
            Err(AttackMemoryError::SelfTarget { .. })
        ));
        assert!(memory.is_empty());
    }
}
