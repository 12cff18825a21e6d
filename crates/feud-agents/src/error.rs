//! Error types for the feud-agents crate.
//!
//! Each store has its own enum. Both map onto the shared
//! [`ErrorCategory`] taxonomy through `category()`.

use feud_types::{ErrorCategory, ItemKind, SubjectId};

/// Errors returned by the [`InventoryStore`](crate::InventoryStore).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InventoryError {
    /// Award and use amounts must be at least one.
    #[error("item amount must be positive, got {amount}")]
    InvalidAmount {
        /// The rejected amount.
        amount: u32,
    },

    /// The owner holds fewer units than requested.
    #[error("insufficient items: {owner} wanted {requested} {item} but has {available}")]
    InsufficientItems {
        /// The holder.
        owner: SubjectId,
        /// The consumable.
        item: ItemKind,
        /// Units the caller asked to use.
        requested: u32,
        /// Units actually held.
        available: u32,
    },

    /// An award would push the quantity past `u32::MAX`.
    #[error("item quantity overflow: {owner} holds {current} {item}, cannot add {amount}")]
    Overflow {
        /// The holder.
        owner: SubjectId,
        /// The consumable.
        item: ItemKind,
        /// Units held before the award.
        current: u32,
        /// Units the award tried to add.
        amount: u32,
    },
}

impl InventoryError {
    /// The taxonomy bucket this error falls into.
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidAmount { .. } => ErrorCategory::Validation,
            Self::InsufficientItems { .. } => ErrorCategory::InsufficientResource,
            Self::Overflow { .. } => ErrorCategory::Internal,
        }
    }
}

/// Errors returned by [`AttackMemory`](crate::AttackMemory).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AttackMemoryError {
    /// The amount at risk must be positive.
    #[error("amount at risk must be positive, got {amount}")]
    InvalidAmount {
        /// The rejected amount.
        amount: i64,
    },

    /// The counter window must be longer than zero.
    #[error("counter window must be positive")]
    InvalidWindow,

    /// A participant cannot attack themselves.
    #[error("{subject} cannot attack themselves")]
    SelfTarget {
        /// The participant named as both attacker and target.
        subject: SubjectId,
    },

    /// No live attack record exists for the target.
    #[error("no counterable attack on {target}")]
    NotFound {
        /// The target that was looked up.
        target: SubjectId,
    },
}

impl AttackMemoryError {
    /// The taxonomy bucket this error falls into.
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidAmount { .. } | Self::InvalidWindow | Self::SelfTarget { .. } => {
                ErrorCategory::Validation
            }
            Self::NotFound { .. } => ErrorCategory::NotFound,
        }
    }
}
