//! Enumeration types for the Feud core.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Direction of a ledger transaction, derived from the sign of its amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Points credited to the subject (positive amount).
    Award,
    /// Points debited from the subject (negative amount).
    Redeem,
}

impl TransactionKind {
    /// Classify a signed, non-zero amount.
    pub const fn for_amount(amount: i64) -> Self {
        if amount < 0 { Self::Redeem } else { Self::Award }
    }
}

// ---------------------------------------------------------------------------
// Attempts
// ---------------------------------------------------------------------------

/// Lifecycle state of a timed attempt.
///
/// `Active` is the only non-terminal state. An attempt leaves the registry
/// the moment it reaches any terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    /// Waiting for a block or for its window to elapse.
    Active,
    /// Countered by enough defenders before the window elapsed.
    Blocked,
    /// The window elapsed without a successful block; the initiator wins.
    Resolved,
    /// Withdrawn administratively; no consequence applied.
    Cancelled,
}

impl AttemptStatus {
    /// Whether this status ends the attempt.
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }
}

// ---------------------------------------------------------------------------
// Items and attacks
// ---------------------------------------------------------------------------

/// A consumable item kind held in the inventory store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    /// Needed to bomb another participant's balance.
    Bomb,
    /// Consumed to reverse the most recent attack within its window.
    Shield,
    /// Awarded to defenders who block an attempt.
    Lockpick,
}

impl ItemKind {
    /// Every item kind, in declaration order.
    pub const ALL: [Self; 3] = [Self::Bomb, Self::Shield, Self::Lockpick];

    /// The lowercase name used in configuration and by command handlers.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Bomb => "bomb",
            Self::Shield => "shield",
            Self::Lockpick => "lockpick",
        }
    }
}

impl core::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// Returned when a string does not name a known [`ItemKind`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown item kind: {0:?}")]
pub struct UnknownItemKind(pub String);

impl FromStr for ItemKind {
    type Err = UnknownItemKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownItemKind(s.to_owned()))
    }
}

/// The kind of attack recorded in attack memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttackKind {
    /// Points moved from the target to the attacker.
    Robbery,
    /// Points destroyed from the target's balance using a bomb.
    Bombing,
}

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// Coarse classification shared by every error the core returns.
///
/// Command handlers map a category to a user-facing reply; the core itself
/// never formats human-readable text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// The request was malformed (bad amount, kind, window, or party).
    Validation,
    /// The request collides with current state (already active, blocked, expired).
    Conflict,
    /// The thing the request refers to does not exist.
    NotFound,
    /// Not enough points or items.
    InsufficientResource,
    /// A failure inside the core or its storage seam.
    Internal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_kind_follows_sign() {
        assert_eq!(TransactionKind::for_amount(5), TransactionKind::Award);
        assert_eq!(TransactionKind::for_amount(-5), TransactionKind::Redeem);
    }

    #[test]
    fn only_active_is_non_terminal() {
        assert!(!AttemptStatus::Active.is_terminal());
        assert!(AttemptStatus::Blocked.is_terminal());
        assert!(AttemptStatus::Resolved.is_terminal());
        assert!(AttemptStatus::Cancelled.is_terminal());
    }

    #[test]
    fn item_kind_parses_case_insensitively() {
        assert_eq!("bomb".parse::<ItemKind>().ok(), Some(ItemKind::Bomb));
        assert_eq!(" Shield ".parse::<ItemKind>().ok(), Some(ItemKind::Shield));
        assert!("grenade".parse::<ItemKind>().is_err());
    }

    #[test]
    fn item_kind_name_roundtrips() {
        for kind in ItemKind::ALL {
            assert_eq!(kind.name().parse::<ItemKind>().ok(), Some(kind));
        }
    }

    #[test]
    fn item_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ItemKind::Lockpick).ok();
        assert_eq!(json.as_deref(), Some("\"lockpick\""));
    }
}
