//! The points ledger: an append-only log of signed transactions.
//!
//! The [`Ledger`] struct is the in-memory representation of every point
//! movement in the game. It holds one account per subject and provides
//! methods for recording entries, checked debits, transfers, balance and
//! history queries, and consistency audits.
//!
//! # Design
//!
//! - **Append-only**: entries are never modified or deleted.
//! - **Log is authority**: each account caches its running balance, but the
//!   cache is updated in the same critical section as the append and
//!   [`Ledger::audit`] proves it equals the recomputed sum.
//! - **Per-subject serialization**: the balance check and the append of a
//!   debit happen under the debited account's lock.
//! - **Journal before visibility**: entries reach the [`Journal`] before
//!   they are pushed, so a failed journal append commits nothing.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info};

use feud_types::{SubjectId, Transaction, TransferId};

use crate::audit::{self, AccountSnapshot, AuditResult};
use crate::journal::{Journal, NullJournal};
use crate::{LedgerError, TransactionBuilder};

// ---------------------------------------------------------------------------
// Result types
// ---------------------------------------------------------------------------

/// The two linked halves of a completed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferReceipt {
    /// Shared by both entries.
    pub transfer_id: TransferId,
    /// The negative entry on the sender's account.
    pub debit: Transaction,
    /// The positive entry on the receiver's account.
    pub credit: Transaction,
}

/// One page of a subject's history, most recent first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryPage {
    /// Entries on this page, newest first.
    pub entries: Vec<Transaction>,
    /// Pass as `before` to fetch the next (older) page. `None` when exhausted.
    pub next_before: Option<u64>,
}

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// One subject's entries plus the cached running balance.
#[derive(Debug, Default)]
struct Account {
    /// Entries in ascending sequence order.
    entries: Vec<Transaction>,
    /// Materialized sum of `entries[..].amount`.
    balance: i64,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// The ledger tracking every point movement in the game.
///
/// The ledger enforces three invariants:
/// 1. Every entry has a non-zero amount (validated at entry creation).
/// 2. A checked debit never takes a balance below zero.
/// 3. The two halves of a transfer are committed together or not at all.
///
/// Shared by reference (usually `Arc<Ledger>`); every method takes `&self`.
#[derive(Debug)]
pub struct Ledger {
    accounts: DashMap<SubjectId, Arc<Mutex<Account>>>,
    /// Next sequence number to hand out.
    next_sequence: AtomicU64,
    journal: Arc<dyn Journal>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    /// Create a new empty, in-memory ledger.
    pub fn new() -> Self {
        Self::with_journal(Arc::new(NullJournal))
    }

    /// Create a new empty ledger that appends every commit to `journal`.
    pub fn with_journal(journal: Arc<dyn Journal>) -> Self {
        Self {
            accounts: DashMap::new(),
            next_sequence: AtomicU64::new(1),
            journal,
        }
    }

    /// Rebuild a ledger from a previously journaled log.
    ///
    /// Entries are applied in sequence order and are not re-appended to
    /// `journal`. New commits continue after the highest restored sequence.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DuplicateSequence`] if two entries share a
    /// sequence number, [`LedgerError::ZeroAmount`] for a zero entry, or
    /// [`LedgerError::Overflow`] if a balance overflows.
    pub fn restore(
        journal: Arc<dyn Journal>,
        mut entries: Vec<Transaction>,
    ) -> Result<Self, LedgerError> {
        entries.sort_by_key(|e| e.sequence);

        let mut accounts: BTreeMap<SubjectId, Account> = BTreeMap::new();
        let mut last_sequence: Option<u64> = None;

        for entry in entries {
            if last_sequence == Some(entry.sequence) {
                return Err(LedgerError::DuplicateSequence {
                    sequence: entry.sequence,
                });
            }
            if entry.amount == 0 {
                return Err(LedgerError::ZeroAmount);
            }
            last_sequence = Some(entry.sequence);

            let account = accounts.entry(entry.subject.clone()).or_default();
            account.balance = account
                .balance
                .checked_add(entry.amount)
                .ok_or(LedgerError::Overflow {
                    context: "restored balance",
                })?;
            account.entries.push(entry);
        }

        let next_sequence = match last_sequence {
            Some(seq) => seq.checked_add(1).ok_or(LedgerError::Overflow {
                context: "restored sequence",
            })?,
            None => 1,
        };

        let subjects = accounts.len();
        let ledger = Self {
            accounts: accounts
                .into_iter()
                .map(|(subject, account)| (subject, Arc::new(Mutex::new(account))))
                .collect(),
            next_sequence: AtomicU64::new(next_sequence),
            journal,
        };

        info!(subjects, next_sequence, "Ledger restored from journal");
        Ok(ledger)
    }

    // -----------------------------------------------------------------------
    // Recording
    // -----------------------------------------------------------------------

    /// Record an unconditional signed movement on `subject`'s balance.
    ///
    /// Positive amounts are awards, negative amounts redeems. No balance
    /// check is made; use [`redeem`](Self::redeem) for a checked debit.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ZeroAmount`] if `amount` is zero, or a
    /// journal/overflow error if the commit cannot be made.
    pub fn record(
        &self,
        subject: &SubjectId,
        amount: i64,
        counterparty: Option<&SubjectId>,
        reason: &str,
    ) -> Result<Transaction, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }

        let account = self.account(subject);
        let mut guard = account.lock();
        let builder = with_counterparty(TransactionBuilder::new(subject.clone(), amount), counterparty)
            .reason(reason);
        let entry = self.commit_one(&mut guard, builder)?;

        debug!(
            subject = %subject,
            amount,
            balance = guard.balance,
            reason,
            "Ledger entry recorded"
        );
        Ok(entry)
    }

    /// Debit `amount` from `subject` only if its balance covers it.
    ///
    /// The balance check and the append are one critical section.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NonPositiveAmount`] if `amount <= 0`, or
    /// [`LedgerError::InsufficientFunds`] if the balance is too low.
    pub fn redeem(
        &self,
        subject: &SubjectId,
        amount: i64,
        counterparty: Option<&SubjectId>,
        reason: &str,
    ) -> Result<Transaction, LedgerError> {
        let debit = negate_positive(amount)?;

        let account = self.funded_account(subject, amount)?;
        let mut guard = account.lock();
        ensure_covers(subject, guard.balance, amount)?;

        let builder = with_counterparty(TransactionBuilder::new(subject.clone(), debit), counterparty)
            .reason(reason);
        let entry = self.commit_one(&mut guard, builder)?;

        debug!(
            subject = %subject,
            amount,
            balance = guard.balance,
            reason,
            "Ledger debit recorded"
        );
        Ok(entry)
    }

    /// Move `amount` points from `from` to `to` as two linked entries.
    ///
    /// Both accounts are locked (in subject-id order) across the balance
    /// check and both appends.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NonPositiveAmount`], [`LedgerError::SelfTransfer`],
    /// or [`LedgerError::InsufficientFunds`]; nothing is committed on error.
    pub fn transfer(
        &self,
        from: &SubjectId,
        to: &SubjectId,
        amount: i64,
        reason: &str,
    ) -> Result<TransferReceipt, LedgerError> {
        let debit_amount = negate_positive(amount)?;
        if from == to {
            return Err(LedgerError::SelfTransfer {
                subject: from.clone(),
            });
        }

        let from_account = self.funded_account(from, amount)?;
        let to_account = self.account(to);
        let (mut from_guard, mut to_guard) = lock_pair(from, &from_account, to, &to_account);

        ensure_covers(from, from_guard.balance, amount)?;
        let from_balance = from_guard
            .balance
            .checked_sub(amount)
            .ok_or(LedgerError::Overflow {
                context: "transfer debit",
            })?;
        let to_balance = to_guard
            .balance
            .checked_add(amount)
            .ok_or(LedgerError::Overflow {
                context: "transfer credit",
            })?;

        let transfer_id = TransferId::new();
        let first = self.reserve_sequences(2)?;
        let second = first.checked_add(1).ok_or(LedgerError::Overflow {
            context: "sequence",
        })?;

        let debit = TransactionBuilder::new(from.clone(), debit_amount)
            .counterparty(to.clone())
            .reason(reason)
            .transfer_id(transfer_id)
            .build(first)?;
        let credit = TransactionBuilder::new(to.clone(), amount)
            .counterparty(from.clone())
            .reason(reason)
            .transfer_id(transfer_id)
            .build(second)?;

        self.journal.append(&[debit.clone(), credit.clone()])?;

        from_guard.balance = from_balance;
        from_guard.entries.push(debit.clone());
        to_guard.balance = to_balance;
        to_guard.entries.push(credit.clone());

        debug!(
            from = %from,
            to = %to,
            amount,
            transfer_id = %transfer_id,
            reason,
            "Ledger transfer recorded"
        );

        Ok(TransferReceipt {
            transfer_id,
            debit,
            credit,
        })
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// The subject's current balance. Unknown subjects have balance 0.
    pub fn balance(&self, subject: &SubjectId) -> i64 {
        self.existing_account(subject)
            .map_or(0, |account| account.lock().balance)
    }

    /// Recompute the subject's balance from its log, ignoring the cache.
    ///
    /// Returns `None` only if the sum overflows `i64`.
    pub fn recomputed_balance(&self, subject: &SubjectId) -> Option<i64> {
        self.existing_account(subject).map_or(Some(0), |account| {
            audit::sum_amounts(&account.lock().entries)
        })
    }

    /// The subject's most recent `limit` entries, newest first.
    pub fn history(&self, subject: &SubjectId, limit: usize) -> Vec<Transaction> {
        self.history_page(subject, None, limit).entries
    }

    /// A page of the subject's entries older than sequence `before`.
    ///
    /// Start with `before = None`; feed each page's `next_before` back in to
    /// walk the full log. Paging is restartable at any cursor because the
    /// log is append-only.
    pub fn history_page(
        &self,
        subject: &SubjectId,
        before: Option<u64>,
        limit: usize,
    ) -> HistoryPage {
        let Some(account) = self.existing_account(subject) else {
            return HistoryPage {
                entries: Vec::new(),
                next_before: None,
            };
        };
        let guard = account.lock();

        let mut older = guard
            .entries
            .iter()
            .rev()
            .filter(|e| before.is_none_or(|cursor| e.sequence < cursor));
        let entries: Vec<Transaction> = older.by_ref().take(limit).cloned().collect();
        let has_more = older.next().is_some();

        let next_before = if has_more {
            entries.last().map(|e| e.sequence)
        } else {
            None
        };

        HistoryPage {
            entries,
            next_before,
        }
    }

    /// Total number of entries across all subjects.
    pub fn len(&self) -> usize {
        self.accounts
            .iter()
            .map(|account| account.value().lock().entries.len())
            .fold(0usize, usize::saturating_add)
    }

    /// Whether no entry has ever been committed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every subject with at least one committed entry, sorted.
    pub fn subjects(&self) -> Vec<SubjectId> {
        let mut subjects: Vec<SubjectId> = self
            .accounts
            .iter()
            .filter(|a| !a.value().lock().entries.is_empty())
            .map(|a| a.key().clone())
            .collect();
        subjects.sort();
        subjects
    }

    /// Every entry in the ledger, in sequence order.
    pub fn all_entries(&self) -> Vec<Transaction> {
        let mut entries: Vec<Transaction> = self
            .snapshot()
            .into_iter()
            .flat_map(|snap| snap.entries)
            .collect();
        entries.sort_by_key(|e| e.sequence);
        entries
    }

    /// Verify cached balances against the log and check transfer pairs.
    ///
    /// Takes a consistent snapshot by locking every account at once.
    pub fn audit(&self) -> AuditResult {
        audit::verify(&self.snapshot())
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// Fetch or create the subject's account handle.
    fn account(&self, subject: &SubjectId) -> Arc<Mutex<Account>> {
        if let Some(existing) = self.existing_account(subject) {
            return existing;
        }
        Arc::clone(self.accounts.entry(subject.clone()).or_default().value())
    }

    fn existing_account(&self, subject: &SubjectId) -> Option<Arc<Mutex<Account>>> {
        self.accounts.get(subject).map(|a| Arc::clone(a.value()))
    }

    /// The account a debit draws on. A subject without one has nothing to
    /// spend, and no account is created for it.
    fn funded_account(
        &self,
        subject: &SubjectId,
        amount: i64,
    ) -> Result<Arc<Mutex<Account>>, LedgerError> {
        self.existing_account(subject)
            .ok_or_else(|| LedgerError::InsufficientFunds {
                subject: subject.clone(),
                requested: amount,
                available: 0,
            })
    }

    /// Hand out `count` consecutive sequence numbers, returning the first.
    fn reserve_sequences(&self, count: u64) -> Result<u64, LedgerError> {
        let first = self.next_sequence.fetch_add(count, Ordering::AcqRel);
        if first.checked_add(count).is_none() {
            return Err(LedgerError::Overflow {
                context: "sequence",
            });
        }
        Ok(first)
    }

    /// Build, journal, and append a single entry to a locked account.
    fn commit_one(
        &self,
        account: &mut Account,
        builder: TransactionBuilder,
    ) -> Result<Transaction, LedgerError> {
        let entry = builder.build(self.reserve_sequences(1)?)?;
        let balance = account
            .balance
            .checked_add(entry.amount)
            .ok_or(LedgerError::Overflow {
                context: "balance",
            })?;

        self.journal.append(core::slice::from_ref(&entry))?;

        account.balance = balance;
        account.entries.push(entry.clone());
        Ok(entry)
    }

    /// Lock every account in subject order and copy it out.
    fn snapshot(&self) -> Vec<AccountSnapshot> {
        let mut handles: Vec<(SubjectId, Arc<Mutex<Account>>)> = self
            .accounts
            .iter()
            .map(|a| (a.key().clone(), Arc::clone(a.value())))
            .collect();
        handles.sort_by(|a, b| a.0.cmp(&b.0));

        let guards: Vec<(SubjectId, MutexGuard<'_, Account>)> = handles
            .iter()
            .map(|(subject, account)| (subject.clone(), account.lock()))
            .collect();

        guards
            .iter()
            .map(|(subject, guard)| AccountSnapshot {
                subject: subject.clone(),
                cached_balance: guard.balance,
                entries: guard.entries.clone(),
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn with_counterparty(
    builder: TransactionBuilder,
    counterparty: Option<&SubjectId>,
) -> TransactionBuilder {
    match counterparty {
        Some(other) => builder.counterparty(other.clone()),
        None => builder,
    }
}

/// Validate a strictly positive amount and return its negation.
fn negate_positive(amount: i64) -> Result<i64, LedgerError> {
    if amount <= 0 {
        return Err(LedgerError::NonPositiveAmount { amount });
    }
    amount.checked_neg().ok_or(LedgerError::Overflow {
        context: "negating debit",
    })
}

fn ensure_covers(subject: &SubjectId, balance: i64, amount: i64) -> Result<(), LedgerError> {
    if balance < amount {
        return Err(LedgerError::InsufficientFunds {
            subject: subject.clone(),
            requested: amount,
            available: balance,
        });
    }
    Ok(())
}

/// Lock two distinct accounts in subject-id order, returning (from, to).
fn lock_pair<'a>(
    from: &SubjectId,
    from_account: &'a Mutex<Account>,
    to: &SubjectId,
    to_account: &'a Mutex<Account>,
) -> (MutexGuard<'a, Account>, MutexGuard<'a, Account>) {
    if from < to {
        let from_guard = from_account.lock();
        let to_guard = to_account.lock();
        (from_guard, to_guard)
    } else {
        let to_guard = to_account.lock();
        let from_guard = from_account.lock();
        (from_guard, to_guard)
    }
}
