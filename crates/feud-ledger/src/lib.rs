//! Append-only points ledger for the Feud core.
//!
//! Every point a participant holds is accounted for by this ledger. A
//! subject's balance is the signed sum of its transactions; no other
//! component mutates balances. The ledger never panics; it returns errors.
//!
//! # Architecture
//!
//! - [`ledger`] -- The [`Ledger`] struct: per-subject accounts, recording,
//!   checked debits, transfers, and history paging.
//! - [`transaction`] -- The [`TransactionBuilder`] for validated entry construction.
//! - [`audit`] -- Consistency verification of cached balances and transfer pairs.
//! - [`journal`] -- The durable-append seam ([`Journal`]) and a JSON-lines implementation.
//!
//! # Concurrency
//!
//! Each subject's account sits behind its own lock. A check-then-commit
//! (`redeem`, `transfer`) holds the debited subject's lock across the
//! balance check and the append, so two concurrent debits can never both
//! pass a check that only one of them satisfies. Transfers lock both
//! accounts in subject-id order.
//!
//! # Usage
//!
//! ```
//! use feud_ledger::{AuditResult, Ledger};
//! use feud_types::SubjectId;
//!
//! let ledger = Ledger::new();
//! let alice = SubjectId::new("alice");
//! let bob = SubjectId::new("bob");
//!
//! ledger.record(&alice, 100, None, "welfare").ok();
//! ledger.transfer(&alice, &bob, 40, "gift").ok();
//!
//! assert_eq!(ledger.balance(&alice), 60);
//! assert_eq!(ledger.balance(&bob), 40);
//! assert_eq!(ledger.audit(), AuditResult::Consistent);
//! ```

pub mod audit;
pub mod journal;
pub mod ledger;
pub mod transaction;

// Re-export primary types at crate root.
pub use audit::{AuditResult, BalanceDrift, LedgerAnomaly};
pub use journal::{Journal, JournalError, JsonLinesJournal, NullJournal, read_json_lines};
pub use ledger::{HistoryPage, Ledger, TransferReceipt};
pub use transaction::TransactionBuilder;

use feud_types::{ErrorCategory, SubjectId};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur when recording ledger entries.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// A recorded amount must be non-zero.
    #[error("ledger amount must be non-zero")]
    ZeroAmount,

    /// Debits and transfers take a strictly positive amount.
    #[error("amount must be positive, got {amount}")]
    NonPositiveAmount {
        /// The rejected amount.
        amount: i64,
    },

    /// A transfer named the same subject on both sides.
    #[error("cannot transfer from {subject} to itself")]
    SelfTransfer {
        /// The subject named twice.
        subject: SubjectId,
    },

    /// A required field was not set on the builder.
    #[error("missing required field: {0}")]
    MissingField(&'static str),

    /// The debited subject's balance does not cover the amount.
    #[error("insufficient funds: {subject} needs {requested} but has {available}")]
    InsufficientFunds {
        /// The subject that would be debited.
        subject: SubjectId,
        /// The amount the caller asked for.
        requested: i64,
        /// The subject's balance at check time.
        available: i64,
    },

    /// A balance or sequence computation overflowed.
    #[error("arithmetic overflow: {context}")]
    Overflow {
        /// What was being computed.
        context: &'static str,
    },

    /// The durable journal refused the append; nothing was committed.
    #[error("journal append failed: {source}")]
    Journal {
        /// The underlying journal error.
        #[from]
        source: JournalError,
    },

    /// A restored log repeats a sequence number.
    #[error("restored log repeats sequence number {sequence}")]
    DuplicateSequence {
        /// The repeated sequence number.
        sequence: u64,
    },
}

impl LedgerError {
    /// The taxonomy bucket this error falls into.
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::ZeroAmount
            | Self::NonPositiveAmount { .. }
            | Self::SelfTransfer { .. }
            | Self::MissingField(_) => ErrorCategory::Validation,
            Self::InsufficientFunds { .. } => ErrorCategory::InsufficientResource,
            Self::Overflow { .. } | Self::Journal { .. } | Self::DuplicateSequence { .. } => {
                ErrorCategory::Internal
            }
        }
    }
}
