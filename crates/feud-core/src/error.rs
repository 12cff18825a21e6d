//! The unified error type returned by the [`Economy`](crate::Economy) facade.

use feud_agents::{AttackMemoryError, InventoryError};
use feud_arena::AttemptError;
use feud_ledger::{JournalError, LedgerError};
use feud_types::ErrorCategory;

/// Any failure of an economy operation.
///
/// Wraps the component error that caused it. Command handlers usually only
/// need [`category`](Self::category).
#[derive(Debug, thiserror::Error)]
pub enum EconomyError {
    /// A ledger operation failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// An inventory operation failed.
    #[error(transparent)]
    Inventory(#[from] InventoryError),

    /// An attack memory operation failed.
    #[error(transparent)]
    Attack(#[from] AttackMemoryError),

    /// An attempt registry operation failed.
    #[error(transparent)]
    Attempt(#[from] AttemptError),

    /// Opening or replaying the ledger journal failed.
    #[error("journal error: {0}")]
    Journal(#[from] JournalError),
}

impl EconomyError {
    /// The taxonomy bucket this error falls into.
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Ledger(err) => err.category(),
            Self::Inventory(err) => err.category(),
            Self::Attack(err) => err.category(),
            Self::Attempt(err) => err.category(),
            Self::Journal(_) => ErrorCategory::Internal,
        }
    }
}
