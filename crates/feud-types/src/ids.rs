//! Type-safe identifier wrappers.
//!
//! Two families of identifiers exist in the core:
//!
//! - **External keys** ([`SubjectId`], [`ArenaId`]) are assigned by the chat
//!   platform that hosts the game. The core never generates them; it only
//!   compares, hashes, and orders them. They wrap a [`String`].
//! - **Core identifiers** ([`TransactionId`], [`TransferId`], [`AttemptId`],
//!   [`AttackId`]) are generated by the core itself using UUID v7
//!   (time-ordered). Ordering between them is never used for correctness;
//!   the ledger orders entries by its own sequence number.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

/// Generates a newtype wrapper around an externally assigned [`String`] key.
macro_rules! define_key {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an externally assigned key.
            pub fn new(key: impl Into<String>) -> Self {
                Self(key.into())
            }

            /// Borrow the key as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Consume the wrapper, returning the raw key.
            pub fn into_inner(self) -> String {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(key: &str) -> Self {
                Self(key.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(key: String) -> Self {
                Self(key)
            }
        }
    };
}

define_key! {
    /// A participant (ledger subject, inventory owner, attack target).
    SubjectId
}

define_key! {
    /// An isolated context, such as one chat room, holding at most one
    /// active attempt.
    ArenaId
}

define_id! {
    /// Unique identifier for a ledger transaction.
    TransactionId
}

define_id! {
    /// Links the debit and credit halves of one ledger transfer.
    TransferId
}

define_id! {
    /// Identifies one attempt instance, distinct from the arena it runs in.
    AttemptId
}

define_id! {
    /// Identifies one recorded attack, distinct from its target.
    AttackId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_ids_are_unique() {
        let a = AttemptId::new();
        let b = AttemptId::new();
        assert_ne!(a, b);
        assert_ne!(a.into_inner(), Uuid::nil());
    }

    #[test]
    fn keys_serialize_as_plain_strings() {
        let subject = SubjectId::new("user-42");
        let json = serde_json::to_string(&subject).ok();
        assert_eq!(json.as_deref(), Some("\"user-42\""));

        let restored: Result<SubjectId, _> = serde_json::from_str("\"user-42\"");
        assert_eq!(restored.ok(), Some(subject));
    }

    #[test]
    fn key_display_matches_raw_key() {
        let arena = ArenaId::from("room-7");
        assert_eq!(arena.to_string(), "room-7");
        assert_eq!(arena.as_str(), "room-7");
    }
}
