//! Counted consumables per owner.
//!
//! Quantities are unsigned and every change uses checked arithmetic, so a
//! quantity can reach zero but never go below it. Entries are created on
//! first award and never removed.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::debug;

use feud_types::{InventoryEntry, ItemKind, SubjectId};

use crate::error::InventoryError;

/// Item holdings keyed by `(owner, item)`.
///
/// Award and use each run under the entry's lock, so concurrent uses of the
/// same item by the same owner are serialized.
#[derive(Debug, Default)]
pub struct InventoryStore {
    entries: DashMap<(SubjectId, ItemKind), u32>,
}

impl InventoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `amount` units of `item` to `owner`, returning the new quantity.
    pub fn award(
        &self,
        owner: &SubjectId,
        item: ItemKind,
        amount: u32,
    ) -> Result<u32, InventoryError> {
        if amount == 0 {
            return Err(InventoryError::InvalidAmount { amount });
        }

        let mut quantity = self.entries.entry((owner.clone(), item)).or_insert(0);
        let current = *quantity;
        let updated = current
            .checked_add(amount)
            .ok_or_else(|| InventoryError::Overflow {
                owner: owner.clone(),
                item,
                current,
                amount,
            })?;
        *quantity = updated;
        drop(quantity);

        debug!(owner = %owner, %item, amount, quantity = updated, "Items awarded");
        Ok(updated)
    }

    /// Consume `count` units of `item` from `owner`, returning the new quantity.
    ///
    /// Fails with [`InventoryError::InsufficientItems`] and changes nothing if
    /// the owner holds fewer than `count`.
    pub fn use_item(
        &self,
        owner: &SubjectId,
        item: ItemKind,
        count: u32,
    ) -> Result<u32, InventoryError> {
        if count == 0 {
            return Err(InventoryError::InvalidAmount { amount: count });
        }

        let insufficient = |available| InventoryError::InsufficientItems {
            owner: owner.clone(),
            item,
            requested: count,
            available,
        };

        let Entry::Occupied(mut slot) = self.entries.entry((owner.clone(), item)) else {
            return Err(insufficient(0));
        };
        let current = *slot.get();
        let remaining = current.checked_sub(count).ok_or_else(|| insufficient(current))?;
        slot.insert(remaining);
        drop(slot);

        debug!(owner = %owner, %item, count, quantity = remaining, "Items used");
        Ok(remaining)
    }

    /// Units of `item` held by `owner`. Zero if never awarded.
    pub fn count(&self, owner: &SubjectId, item: ItemKind) -> u32 {
        self.entries
            .get(&(owner.clone(), item))
            .map_or(0, |quantity| *quantity)
    }

    /// Every entry `owner` has ever been awarded, zero quantities included.
    pub fn holdings(&self, owner: &SubjectId) -> Vec<InventoryEntry> {
        ItemKind::ALL
            .iter()
            .filter_map(|item| {
                self.entries
                    .get(&(owner.clone(), *item))
                    .map(|quantity| InventoryEntry {
                        owner: owner.clone(),
                        item: *item,
                        quantity: *quantity,
                    })
            })
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn owner() -> SubjectId {
        SubjectId::new("owner")
    }

    #[test]
    fn use_at_zero_fails_and_leaves_zero() {
        let store = InventoryStore::new();
        let result = store.use_item(&owner(), ItemKind::Bomb, 1);
        assert_eq!(
            result,
            Err(InventoryError::InsufficientItems {
                owner: owner(),
                item: ItemKind::Bomb,
                requested: 1,
                available: 0,
            })
        );
        assert_eq!(store.count(&owner(), ItemKind::Bomb), 0);
    }

    #[test]
    fn award_then_use_leaves_difference() {
        let store = InventoryStore::new();
        assert_eq!(store.award(&owner(), ItemKind::Shield, 3).unwrap(), 3);
        assert_eq!(store.use_item(&owner(), ItemKind::Shield, 2).unwrap(), 1);
        assert_eq!(store.count(&owner(), ItemKind::Shield), 1);

        let err = store.use_item(&owner(), ItemKind::Shield, 2).unwrap_err();
        assert!(matches!(
            err,
            InventoryError::InsufficientItems { available: 1, .. }
        ));
        assert_eq!(store.count(&owner(), ItemKind::Shield), 1);
    }

    #[test]
    fn zero_amounts_rejected() {
        let store = InventoryStore::new();
        assert_eq!(
            store.award(&owner(), ItemKind::Bomb, 0),
            Err(InventoryError::InvalidAmount { amount: 0 })
        );
        assert_eq!(
            store.use_item(&owner(), ItemKind::Bomb, 0),
            Err(InventoryError::InvalidAmount { amount: 0 })
        );
    }

    #[test]
    fn award_overflow_is_typed_error() {
        let store = InventoryStore::new();
        store.award(&owner(), ItemKind::Lockpick, u32::MAX).unwrap();
        let err = store.award(&owner(), ItemKind::Lockpick, 1).unwrap_err();
        assert!(matches!(err, InventoryError::Overflow { current: u32::MAX, .. }));
        assert_eq!(store.count(&owner(), ItemKind::Lockpick), u32::MAX);
    }

    #[test]
    fn holdings_include_zero_entries_only_after_award() {
        let store = InventoryStore::new();
        assert!(store.holdings(&owner()).is_empty());

        store.award(&owner(), ItemKind::Bomb, 1).unwrap();
        store.use_item(&owner(), ItemKind::Bomb, 1).unwrap();
        store.award(&owner(), ItemKind::Shield, 2).unwrap();

        let holdings = store.holdings(&owner());
        assert_eq!(holdings.len(), 2);
        assert!(
            holdings
                .iter()
                .any(|e| e.item == ItemKind::Bomb && e.quantity == 0)
        );
        assert!(
            holdings
                .iter()
                .any(|e| e.item == ItemKind::Shield && e.quantity == 2)
        );
    }

    #[test]
    fn owners_are_independent() {
        let store = InventoryStore::new();
        store.award(&owner(), ItemKind::Bomb, 5).unwrap();
        assert_eq!(store.count(&SubjectId::new("other"), ItemKind::Bomb), 0);
    }

    #[test]
    fn concurrent_uses_never_exceed_stock() {
        let store = Arc::new(InventoryStore::new());
        store.award(&owner(), ItemKind::Bomb, 50).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    (0..20)
                        .filter(|_| store.use_item(&owner(), ItemKind::Bomb, 1).is_ok())
                        .count()
                })
            })
            .collect();

        let used: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(used, 50);
        assert_eq!(store.count(&owner(), ItemKind::Bomb), 0);
    }
}
