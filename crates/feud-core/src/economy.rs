//! The [`Economy`] facade.
//!
//! Owns one instance of every component and implements the operations that
//! span more than one of them. A spanning operation that fails part-way
//! rolls back the steps it already took (a compensating credit or an item
//! re-award) before returning the error.

use std::sync::Arc;

use tracing::{error, info, warn};

use feud_agents::{AttackMemory, InventoryStore, NewAttack};
use feud_arena::registry::REFUND_REASON;
use feud_arena::{AttemptRegistry, BlockOutcome, ResolutionHandler, StartRequest};
use feud_ledger::{
    JsonLinesJournal, Journal, Ledger, LedgerError, NullJournal, read_json_lines,
};
use feud_types::{ArenaId, AttackKind, AttackRecord, Attempt, ItemKind, SubjectId, Transaction};

use crate::config::EconomyConfig;
use crate::error::EconomyError;

/// Ledger reason for a defender's reward.
pub const DEFENDER_REWARD_REASON: &str = "defender reward";

/// Ledger reason for points restored by a shield.
pub const SHIELD_REASON: &str = "shield restore";

/// Ledger reason for undoing a raid whose attack record could not be kept.
pub const RAID_REVERSAL_REASON: &str = "raid reversal";

// ---------------------------------------------------------------------------
// Operation types
// ---------------------------------------------------------------------------

/// Parameters of [`Economy::raid`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raid {
    /// The participant taking or destroying points.
    pub attacker: SubjectId,
    /// The participant losing points.
    pub target: SubjectId,
    /// Robbery moves points to the attacker; bombing destroys them.
    pub kind: AttackKind,
    /// Points taken from the target.
    pub amount: i64,
    /// Free-form reason recorded on the ledger and the attack record.
    pub reason: String,
}

/// What one defender received for a blocked attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefenderReward {
    /// The rewarded defender.
    pub defender: SubjectId,
    /// The points entry, if points are configured.
    pub points: Option<Transaction>,
    /// The item and units awarded, if an item is configured.
    pub item: Option<(ItemKind, u32)>,
}

/// The result of [`Economy::block_attempt`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockResolution {
    /// What the registry decided.
    pub outcome: BlockOutcome,
    /// Rewards paid out. Empty while the quorum is pending.
    pub rewards: Vec<DefenderReward>,
}

/// What became of the cost of a cancelled attempt.
#[derive(Debug)]
pub enum Refund {
    /// No refund was asked for; the cost stays spent.
    NotRequested,
    /// The cost was credited back to the initiator.
    Credited(Transaction),
    /// The credit failed. The attempt is cancelled all the same.
    Failed(LedgerError),
}

impl Refund {
    /// Whether the cost is back with the initiator.
    pub const fn is_credited(&self) -> bool {
        matches!(self, Self::Credited(_))
    }
}

/// The result of [`Economy::cancel_attempt`].
#[derive(Debug)]
pub struct Cancellation {
    /// The withdrawn attempt, with status `Cancelled`.
    pub attempt: Attempt,
    /// The refund outcome.
    pub refund: Refund,
}

// ---------------------------------------------------------------------------
// Economy
// ---------------------------------------------------------------------------

/// The economy and conflict core.
#[derive(Debug)]
pub struct Economy {
    config: EconomyConfig,
    ledger: Arc<Ledger>,
    inventory: InventoryStore,
    attacks: AttackMemory,
    attempts: AttemptRegistry,
}

impl Economy {
    /// Build an economy around an existing ledger.
    pub fn with_ledger(
        config: EconomyConfig,
        ledger: Arc<Ledger>,
        handler: Arc<dyn ResolutionHandler>,
    ) -> Self {
        let attempts = AttemptRegistry::new(Arc::clone(&ledger), handler, config.registry());
        Self {
            config,
            ledger,
            inventory: InventoryStore::new(),
            attacks: AttackMemory::new(),
            attempts,
        }
    }

    /// Build an economy with a fresh in-memory ledger.
    pub fn in_memory(config: EconomyConfig, handler: Arc<dyn ResolutionHandler>) -> Self {
        Self::with_ledger(config, Arc::new(Ledger::new()), handler)
    }

    /// Build an economy as configured.
    ///
    /// With `journal.path` set, an existing journal file is replayed into
    /// the ledger and new entries are appended to it. Without it the ledger
    /// is in-memory only.
    pub fn open(
        config: EconomyConfig,
        handler: Arc<dyn ResolutionHandler>,
    ) -> Result<Self, EconomyError> {
        let ledger = match &config.journal.path {
            Some(path) => {
                let entries = if path.exists() {
                    read_json_lines(path)?
                } else {
                    Vec::new()
                };
                let replayed = entries.len();
                let journal: Arc<dyn Journal> = Arc::new(JsonLinesJournal::open(path)?);
                let ledger = Ledger::restore(journal, entries)?;
                info!(path = %path.display(), replayed, "Ledger journal opened");
                ledger
            }
            None => Ledger::with_journal(Arc::new(NullJournal)),
        };
        Ok(Self::with_ledger(config, Arc::new(ledger), handler))
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// The configuration this economy was built from.
    pub const fn config(&self) -> &EconomyConfig {
        &self.config
    }

    /// The points ledger.
    pub const fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// The item inventory.
    pub const fn inventory(&self) -> &InventoryStore {
        &self.inventory
    }

    /// The attack memory.
    pub const fn attacks(&self) -> &AttackMemory {
        &self.attacks
    }

    /// The attempt registry.
    pub const fn attempts(&self) -> &AttemptRegistry {
        &self.attempts
    }

    // -----------------------------------------------------------------------
    // Points
    // -----------------------------------------------------------------------

    /// Award `amount` points to `subject`. The amount must be positive.
    pub fn grant(
        &self,
        subject: &SubjectId,
        amount: i64,
        reason: &str,
    ) -> Result<Transaction, EconomyError> {
        if amount <= 0 {
            return Err(LedgerError::NonPositiveAmount { amount }.into());
        }
        Ok(self.ledger.record(subject, amount, None, reason)?)
    }

    // -----------------------------------------------------------------------
    // Attempts
    // -----------------------------------------------------------------------

    /// Start an attempt with the configured cost and window.
    pub fn start_attempt(
        &self,
        arena: &ArenaId,
        initiator: &SubjectId,
        target: &SubjectId,
    ) -> Result<Attempt, EconomyError> {
        self.start_attempt_with(
            arena,
            initiator,
            target,
            self.config.attempts.cost,
            self.config.attempts.window_ms,
        )
    }

    /// Start an attempt with an explicit cost and window.
    pub fn start_attempt_with(
        &self,
        arena: &ArenaId,
        initiator: &SubjectId,
        target: &SubjectId,
        cost: i64,
        window_ms: u64,
    ) -> Result<Attempt, EconomyError> {
        Ok(self.attempts.start(StartRequest {
            arena: arena.clone(),
            initiator: initiator.clone(),
            target: target.clone(),
            cost,
            window_ms,
        })?)
    }

    /// Block the arena's attempt and reward every defender once it is blocked.
    ///
    /// Rewards are paid after the block has been committed. A reward that
    /// fails is logged and left out of the result; it never undoes the block.
    pub fn block_attempt(
        &self,
        arena: &ArenaId,
        defender: &SubjectId,
    ) -> Result<BlockResolution, EconomyError> {
        let outcome = self.attempts.block(arena, defender)?;

        let rewards = match &outcome {
            BlockOutcome::Pending { .. } => Vec::new(),
            BlockOutcome::Blocked { attempt, defenders } => defenders
                .iter()
                .map(|d| self.reward_defender(attempt, d))
                .collect(),
        };

        Ok(BlockResolution { outcome, rewards })
    }

    /// Withdraw the arena's attempt. With `refund`, the initiator gets the
    /// cost back.
    ///
    /// Once the registry has cancelled the attempt the cancellation stands,
    /// so a failed refund is reported in [`Cancellation::refund`] rather
    /// than as an error. `Err` means nothing was cancelled.
    pub fn cancel_attempt(
        &self,
        arena: &ArenaId,
        refund: bool,
    ) -> Result<Cancellation, EconomyError> {
        let attempt = self.attempts.cancel(arena)?;
        if !refund {
            return Ok(Cancellation {
                attempt,
                refund: Refund::NotRequested,
            });
        }

        let refund = match self.ledger.record(
            &attempt.initiator,
            attempt.cost,
            Some(&attempt.target),
            REFUND_REASON,
        ) {
            Ok(entry) => Refund::Credited(entry),
            Err(err) => {
                error!(
                    arena = %arena,
                    attempt_id = %attempt.id,
                    initiator = %attempt.initiator,
                    cost = attempt.cost,
                    error = %err,
                    "Cancelled attempt could not be refunded"
                );
                Refund::Failed(err)
            }
        };
        Ok(Cancellation { attempt, refund })
    }

    fn reward_defender(&self, attempt: &Attempt, defender: &SubjectId) -> DefenderReward {
        let settings = &self.config.attempts;

        let points = if settings.defender_points > 0 {
            match self.ledger.record(
                defender,
                settings.defender_points,
                Some(&attempt.initiator),
                DEFENDER_REWARD_REASON,
            ) {
                Ok(entry) => Some(entry),
                Err(err) => {
                    error!(defender = %defender, error = %err, "Defender point reward failed");
                    None
                }
            }
        } else {
            None
        };

        let item = match settings.defender_item {
            Some(kind) if settings.defender_item_count > 0 => {
                match self
                    .inventory
                    .award(defender, kind, settings.defender_item_count)
                {
                    Ok(_) => Some((kind, settings.defender_item_count)),
                    Err(err) => {
                        error!(defender = %defender, error = %err, "Defender item reward failed");
                        None
                    }
                }
            }
            _ => None,
        };

        DefenderReward {
            defender: defender.clone(),
            points,
            item,
        }
    }

    // -----------------------------------------------------------------------
    // Attacks
    // -----------------------------------------------------------------------

    /// Take points from a target and remember the attack for a counter.
    ///
    /// A robbery transfers the points to the attacker. A bombing costs the
    /// attacker one bomb and destroys the points; the bomb is returned if
    /// the target cannot pay.
    pub fn raid(&self, raid: Raid) -> Result<AttackRecord, EconomyError> {
        let attack = NewAttack {
            target: raid.target.clone(),
            attacker: raid.attacker.clone(),
            kind: raid.kind,
            amount_at_risk: raid.amount,
            reason: raid.reason.clone(),
            window_ms: self.config.attacks.counter_window_ms,
        };
        attack.validate()?;

        match raid.kind {
            AttackKind::Robbery => {
                self.ledger
                    .transfer(&raid.target, &raid.attacker, raid.amount, &raid.reason)?;
            }
            AttackKind::Bombing => {
                self.inventory.use_item(&raid.attacker, ItemKind::Bomb, 1)?;
                if let Err(err) =
                    self.ledger
                        .redeem(&raid.target, raid.amount, Some(&raid.attacker), &raid.reason)
                {
                    self.return_item(&raid.attacker, ItemKind::Bomb);
                    return Err(err.into());
                }
            }
        }

        match self.attacks.record_attack(attack) {
            Ok(record) => {
                info!(
                    attacker = %raid.attacker,
                    target_id = %raid.target,
                    kind = ?raid.kind,
                    amount = raid.amount,
                    "Raid recorded"
                );
                Ok(record)
            }
            Err(err) => {
                self.reverse_raid(&raid);
                Err(err.into())
            }
        }
    }

    /// Counter the most recent attack on `target` with a shield.
    ///
    /// Uses one shield, consumes the attack record, and credits the amount
    /// at risk back to the target. The shield is returned if there is no
    /// live record to counter. If the credit fails, the shield is returned
    /// and the record is put back so the counter can be retried inside the
    /// same window.
    pub fn shield(&self, target: &SubjectId) -> Result<AttackRecord, EconomyError> {
        self.inventory.use_item(target, ItemKind::Shield, 1)?;

        let taken = match self.attacks.take_if_present(target) {
            Ok(taken) => taken,
            Err(err) => {
                self.return_item(target, ItemKind::Shield);
                return Err(err.into());
            }
        };

        let credited = self.ledger.record(
            target,
            taken.record().amount_at_risk,
            Some(&taken.record().attacker),
            SHIELD_REASON,
        );
        if let Err(err) = credited {
            let attack_id = taken.record().id;
            if !self.attacks.restore(taken) {
                warn!(
                    target_id = %target,
                    attack_id = %attack_id,
                    "Attack record not restored after failed shield credit"
                );
            }
            self.return_item(target, ItemKind::Shield);
            return Err(err.into());
        }

        let record = taken.into_record();
        info!(
            target_id = %target,
            attacker = %record.attacker,
            amount = record.amount_at_risk,
            "Attack countered with shield"
        );
        Ok(record)
    }

    fn return_item(&self, owner: &SubjectId, item: ItemKind) {
        if let Err(err) = self.inventory.award(owner, item, 1) {
            error!(owner = %owner, %item, error = %err, "Failed to return item");
        }
    }

    /// Undo the ledger effect of a raid whose record could not be stored.
    fn reverse_raid(&self, raid: &Raid) {
        warn!(attacker = %raid.attacker, target_id = %raid.target, "Reversing raid");
        let restored = self.ledger.record(
            &raid.target,
            raid.amount,
            Some(&raid.attacker),
            RAID_REVERSAL_REASON,
        );
        let clawed_back = match raid.kind {
            AttackKind::Robbery => self
                .ledger
                .record(
                    &raid.attacker,
                    raid.amount.saturating_neg(),
                    Some(&raid.target),
                    RAID_REVERSAL_REASON,
                )
                .map(|_| ()),
            AttackKind::Bombing => {
                self.return_item(&raid.attacker, ItemKind::Bomb);
                Ok(())
            }
        };
        if let Err(err) = restored.map(|_| ()).and(clawed_back) {
            error!(
                attacker = %raid.attacker,
                target_id = %raid.target,
                error = %err,
                "Raid reversal failed"
            );
        }
    }
}
