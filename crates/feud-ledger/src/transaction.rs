//! Transaction builder and validation for the ledger.
//!
//! Provides a [`TransactionBuilder`] that enforces the entry invariants:
//! a non-zero amount and a reason. The [`TransactionKind`] is derived from
//! the sign of the amount, never supplied by the caller, so an award can
//! never carry a negative amount or a redeem a positive one.

use chrono::Utc;

use feud_types::{SubjectId, Transaction, TransactionId, TransactionKind, TransferId};

use crate::LedgerError;

// ---------------------------------------------------------------------------
// Transaction builder
// ---------------------------------------------------------------------------

/// Builder for constructing validated [`Transaction`] values.
///
/// The ledger assigns the sequence number at commit time, so `build` takes
/// it as an argument rather than a setter.
///
/// # Examples
///
/// ```
/// use feud_ledger::TransactionBuilder;
/// use feud_types::{SubjectId, TransactionKind};
///
/// let entry = TransactionBuilder::new(SubjectId::new("alice"), -25)
///     .counterparty(SubjectId::new("bob"))
///     .reason("robbery")
///     .build(7);
///
/// assert!(entry.is_ok());
/// assert_eq!(entry.ok().map(|e| e.kind), Some(TransactionKind::Redeem));
/// ```
#[derive(Debug)]
pub struct TransactionBuilder {
    subject: SubjectId,
    amount: i64,
    counterparty: Option<SubjectId>,
    reason: Option<String>,
    transfer_id: Option<TransferId>,
}

impl TransactionBuilder {
    /// Start building an entry that changes `subject`'s balance by `amount`.
    pub const fn new(subject: SubjectId, amount: i64) -> Self {
        Self {
            subject,
            amount,
            counterparty: None,
            reason: None,
            transfer_id: None,
        }
    }

    /// Set the other party of the movement.
    #[must_use]
    pub fn counterparty(mut self, counterparty: SubjectId) -> Self {
        self.counterparty = Some(counterparty);
        self
    }

    /// Set the reason for the movement.
    #[must_use]
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Link this entry to the other half of a transfer.
    #[must_use]
    pub const fn transfer_id(mut self, id: TransferId) -> Self {
        self.transfer_id = Some(id);
        self
    }

    /// Validate inputs and produce a [`Transaction`] with the given sequence.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::ZeroAmount`] if the amount is zero.
    /// Returns [`LedgerError::MissingField`] if no reason was set.
    pub fn build(self, sequence: u64) -> Result<Transaction, LedgerError> {
        if self.amount == 0 {
            return Err(LedgerError::ZeroAmount);
        }
        let reason = self.reason.ok_or(LedgerError::MissingField("reason"))?;

        Ok(Transaction {
            id: TransactionId::new(),
            sequence,
            subject: self.subject,
            amount: self.amount,
            kind: TransactionKind::for_amount(self.amount),
            counterparty: self.counterparty,
            reason,
            transfer_id: self.transfer_id,
            created_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> SubjectId {
        SubjectId::new("alice")
    }

    #[test]
    fn builder_produces_valid_entry() {
        let result = TransactionBuilder::new(alice(), 40)
            .counterparty(SubjectId::new("bob"))
            .reason("gift")
            .build(3);

        assert!(result.is_ok());
        if let Ok(entry) = result {
            assert_eq!(entry.sequence, 3);
            assert_eq!(entry.amount, 40);
            assert_eq!(entry.kind, TransactionKind::Award);
            assert_eq!(entry.counterparty, Some(SubjectId::new("bob")));
            assert_eq!(entry.reason, "gift");
            assert!(entry.transfer_id.is_none());
        }
    }

    #[test]
    fn negative_amount_is_a_redeem() {
        let entry = TransactionBuilder::new(alice(), -5).reason("fee").build(1);
        assert_eq!(entry.ok().map(|e| e.kind), Some(TransactionKind::Redeem));
    }

    #[test]
    fn zero_amount_rejected() {
        let result = TransactionBuilder::new(alice(), 0).reason("noop").build(1);
        assert!(matches!(result, Err(LedgerError::ZeroAmount)));
    }

    #[test]
    fn missing_reason_rejected() {
        let result = TransactionBuilder::new(alice(), 10).build(1);
        assert!(matches!(result, Err(LedgerError::MissingField("reason"))));
    }

    #[test]
    fn transfer_id_is_optional() {
        let link = TransferId::new();
        let entry = TransactionBuilder::new(alice(), 10)
            .reason("gift")
            .transfer_id(link)
            .build(1);
        assert_eq!(entry.ok().and_then(|e| e.transfer_id), Some(link));
    }
}
