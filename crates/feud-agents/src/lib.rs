//! Per-participant state for the Feud core.
//!
//! Everything here is keyed by participant and lives behind sharded
//! concurrent maps: operations on distinct keys run in parallel, while a
//! read-modify-write on one key holds that key's entry lock.
//!
//! # Modules
//!
//! - [`error`] -- Error types ([`InventoryError`], [`AttackMemoryError`])
//! - [`inventory`] -- Counted consumables per owner ([`InventoryStore`])
//! - [`memory`] -- The most recent counterable attack per target ([`AttackMemory`])

pub mod error;
pub mod inventory;
pub mod memory;

pub use error::{AttackMemoryError, InventoryError};
pub use inventory::InventoryStore;
pub use memory::{AttackMemory, ConsumedAttack, NewAttack};
