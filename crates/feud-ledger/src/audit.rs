//! Consistency verification for the points ledger.
//!
//! Each account caches its running balance next to its log. The log is the
//! authority, so the audit recomputes every balance from scratch and
//! compares it with the cache:
//!
//! ```text
//! cached_balance(S) == sum(entry.amount for entry in log(S))
//! ```
//!
//! It also checks that every transfer is a well-formed pair: exactly two
//! entries sharing a transfer id, amounts summing to zero, and each naming
//! the other's subject as its counterparty.
//!
//! Both checks hold by construction. A violation produces a
//! [`LedgerAnomaly`] and points at corruption or a bug in the commit path.

use std::collections::BTreeMap;

use feud_types::{SubjectId, Transaction, TransferId};

/// The result of a ledger audit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditResult {
    /// Every cached balance matches its log and every transfer is paired.
    Consistent,
    /// At least one check failed.
    Anomaly(LedgerAnomaly),
}

/// Details of a failed audit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerAnomaly {
    /// Subjects whose cached balance disagrees with their log.
    pub drifts: Vec<BalanceDrift>,
    /// Transfers that are not a well-formed pair.
    pub broken_transfers: Vec<TransferId>,
    /// Human-readable summary.
    pub message: String,
}

/// A cached balance that disagrees with its recomputed value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceDrift {
    /// The affected subject.
    pub subject: SubjectId,
    /// The balance the account reports.
    pub cached: i64,
    /// The signed sum of the account's log, or `None` if it overflows.
    pub recomputed: Option<i64>,
}

/// A point-in-time copy of one account, taken under its lock.
#[derive(Debug, Clone)]
pub(crate) struct AccountSnapshot {
    pub(crate) subject: SubjectId,
    pub(crate) cached_balance: i64,
    pub(crate) entries: Vec<Transaction>,
}

/// Signed sum of entry amounts, `None` on overflow.
pub(crate) fn sum_amounts(entries: &[Transaction]) -> Option<i64> {
    entries
        .iter()
        .try_fold(0i64, |acc, entry| acc.checked_add(entry.amount))
}

/// Verify a consistent snapshot of every account.
pub(crate) fn verify(accounts: &[AccountSnapshot]) -> AuditResult {
    let mut drifts = Vec::new();
    let mut transfers: BTreeMap<TransferId, Vec<&Transaction>> = BTreeMap::new();

    for account in accounts {
        let recomputed = sum_amounts(&account.entries);
        if recomputed != Some(account.cached_balance) {
            drifts.push(BalanceDrift {
                subject: account.subject.clone(),
                cached: account.cached_balance,
                recomputed,
            });
        }

        for entry in &account.entries {
            if let Some(link) = entry.transfer_id {
                transfers.entry(link).or_default().push(entry);
            }
        }
    }

    let broken_transfers: Vec<TransferId> = transfers
        .iter()
        .filter(|(_, halves)| !is_well_formed_pair(halves))
        .map(|(id, _)| *id)
        .collect();

    if drifts.is_empty() && broken_transfers.is_empty() {
        return AuditResult::Consistent;
    }

    let message = format!(
        "LEDGER_ANOMALY: {} balance drift(s), {} broken transfer(s)",
        drifts.len(),
        broken_transfers.len(),
    );
    AuditResult::Anomaly(LedgerAnomaly {
        drifts,
        broken_transfers,
        message,
    })
}

fn is_well_formed_pair(halves: &[&Transaction]) -> bool {
    let [a, b] = halves else {
        return false;
    };
    a.amount.checked_add(b.amount) == Some(0)
        && a.counterparty.as_ref() == Some(&b.subject)
        && b.counterparty.as_ref() == Some(&a.subject)
}
