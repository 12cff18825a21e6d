//! Core data model shared by the ledger, the stores, and the registry.
//!
//! These are plain snapshot values. The components that own the live state
//! hand out clones of them; mutating a snapshot never affects the component.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enums::{AttackKind, AttemptStatus, ItemKind, TransactionKind};
use crate::ids::{ArenaId, AttackId, AttemptId, SubjectId, TransactionId, TransferId};

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// One immutable entry in the append-only ledger.
///
/// A subject's balance is the sum of `amount` over all its transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique entry identifier.
    pub id: TransactionId,
    /// Process-wide commit order. Strictly increasing across the ledger.
    pub sequence: u64,
    /// The subject whose balance this entry changes.
    pub subject: SubjectId,
    /// Signed, non-zero point delta.
    pub amount: i64,
    /// Award or redeem, derived from the sign of `amount`.
    pub kind: TransactionKind,
    /// The other party, when the entry moves points between participants.
    pub counterparty: Option<SubjectId>,
    /// Free-form reason supplied by the caller (e.g. `"welfare"`).
    pub reason: String,
    /// Shared by the two halves of a transfer.
    pub transfer_id: Option<TransferId>,
    /// Wall-clock commit time.
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Attempts
// ---------------------------------------------------------------------------

/// Snapshot of a timed adversarial attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attempt {
    /// The attempt instance. A reused arena gets a fresh id.
    pub id: AttemptId,
    /// The arena the attempt occupies.
    pub arena: ArenaId,
    /// Who launched the attempt and paid its cost.
    pub initiator: SubjectId,
    /// Who the attempt is aimed at.
    pub target: SubjectId,
    /// Points debited from the initiator at start.
    pub cost: i64,
    /// Wall-clock start time.
    pub started_at: DateTime<Utc>,
    /// Length of the counter window in milliseconds.
    pub window_ms: u64,
    /// Defenders in the order they blocked. Never contains duplicates.
    pub defenders: Vec<SubjectId>,
    /// Defenders needed before the attempt counts as blocked.
    pub defenders_required: u32,
    /// Current lifecycle state.
    pub status: AttemptStatus,
}

impl Attempt {
    /// Whether `subject` has already blocked this attempt.
    pub fn is_defender(&self, subject: &SubjectId) -> bool {
        self.defenders.contains(subject)
    }
}

// ---------------------------------------------------------------------------
// Attack memory
// ---------------------------------------------------------------------------

/// The most recent attack on a target, eligible for a counter-defense.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackRecord {
    /// Identifies this record; an overwrite produces a new id.
    pub id: AttackId,
    /// The participant who lost points.
    pub target: SubjectId,
    /// The participant who caused the loss.
    pub attacker: SubjectId,
    /// How the loss happened.
    pub kind: AttackKind,
    /// Points restored to the target if the attack is countered.
    pub amount_at_risk: i64,
    /// Free-form reason supplied by the caller.
    pub reason: String,
    /// Wall-clock time the attack was recorded.
    pub recorded_at: DateTime<Utc>,
    /// Length of the counter window in milliseconds.
    pub window_ms: u64,
}

// ---------------------------------------------------------------------------
// Inventory
// ---------------------------------------------------------------------------

/// A counted consumable held by one owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEntry {
    /// The holder.
    pub owner: SubjectId,
    /// Which consumable.
    pub item: ItemKind,
    /// Units held. May be zero; never negative.
    pub quantity: u32,
}
