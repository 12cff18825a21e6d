//! Error types for attempt registry operations.

use feud_ledger::LedgerError;
use feud_types::{ArenaId, ErrorCategory, SubjectId};

/// Errors returned by the [`AttemptRegistry`](crate::AttemptRegistry).
#[derive(Debug, thiserror::Error)]
pub enum AttemptError {
    /// The attempt cost must be positive.
    #[error("attempt cost must be positive, got {cost}")]
    InvalidAmount {
        /// The rejected cost.
        cost: i64,
    },

    /// The counter window must be longer than zero.
    #[error("attempt window must be positive")]
    InvalidWindow,

    /// The initiator named themselves as the target.
    #[error("{subject} cannot target themselves")]
    SelfTarget {
        /// The participant named twice.
        subject: SubjectId,
    },

    /// The initiator tried to block their own attempt.
    #[error("{subject} cannot defend against their own attempt")]
    InitiatorCannotDefend {
        /// The initiator.
        subject: SubjectId,
    },

    /// The arena already holds an unresolved attempt.
    #[error("arena {arena} already has an active attempt")]
    AlreadyActive {
        /// The occupied arena.
        arena: ArenaId,
    },

    /// The defender has already blocked this attempt.
    #[error("{defender} already blocked the attempt in {arena}")]
    AlreadyBlocked {
        /// The arena.
        arena: ArenaId,
        /// The repeated defender.
        defender: SubjectId,
    },

    /// The attempt's window had closed before the request arrived.
    #[error("the attempt in {arena} has already expired")]
    AlreadyExpired {
        /// The arena.
        arena: ArenaId,
    },

    /// No attempt is active in the arena.
    #[error("no active attempt in {arena}")]
    NoActiveAttempt {
        /// The arena.
        arena: ArenaId,
    },

    /// Debiting or refunding the attempt cost failed.
    #[error("ledger error: {source}")]
    Ledger {
        /// The underlying ledger error.
        #[from]
        source: LedgerError,
    },

    /// No tokio runtime was available to arm the resolution timer.
    #[error("no async runtime available to arm the resolution timer")]
    RuntimeUnavailable,
}

impl AttemptError {
    /// The taxonomy bucket this error falls into.
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidAmount { .. }
            | Self::InvalidWindow
            | Self::SelfTarget { .. }
            | Self::InitiatorCannotDefend { .. } => ErrorCategory::Validation,
            Self::AlreadyActive { .. }
            | Self::AlreadyBlocked { .. }
            | Self::AlreadyExpired { .. } => ErrorCategory::Conflict,
            Self::NoActiveAttempt { .. } => ErrorCategory::NotFound,
            Self::Ledger { source } => source.category(),
            Self::RuntimeUnavailable => ErrorCategory::Internal,
        }
    }
}
