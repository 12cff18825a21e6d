//! Shared type definitions for the Feud economy and conflict core.
//!
//! This crate is the single source of truth for the data model used across
//! the workspace: identifiers, enumerations, and the snapshot structs the
//! ledger, inventory store, attack memory, and attempt registry hand out.
//!
//! # Modules
//!
//! - [`ids`] -- External string keys and core-generated UUID identifiers
//! - [`enums`] -- Transaction kinds, attempt states, items, attacks, error categories
//! - [`structs`] -- `Transaction`, `Attempt`, `AttackRecord`, `InventoryEntry`

pub mod enums;
pub mod ids;
pub mod structs;

// Re-export all public types at crate root for convenience.
pub use enums::{
    AttackKind, AttemptStatus, ErrorCategory, ItemKind, TransactionKind, UnknownItemKind,
};
pub use ids::{ArenaId, AttackId, AttemptId, SubjectId, TransactionId, TransferId};
pub use structs::{AttackRecord, Attempt, InventoryEntry, Transaction};
