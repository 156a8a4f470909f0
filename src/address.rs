//! Agent addresses.
//!
//! An [`Address`] identifies exactly one variable together with the agent
//! that owns it (or one Max-Sum function node). Addresses are minted fresh
//! from a v4 UUID and are never reused; code obtains them only from identity
//! accessors or from message content, never by constructing a lookalike.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque, unique identifier of a node in the constraint network.
///
/// Equality, hashing and ordering use the UUID alone. The label only exists
/// to make logs readable.
#[derive(Clone, Serialize, Deserialize)]
pub struct Address {
    id: Uuid,
    label: String,
}

impl Address {
    /// Mint a new address with a human-readable label.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
        }
    }

    /// The underlying UUID.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The human-readable label given at construction.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Deterministic 64-bit fold of the UUID.
    ///
    /// Unlike `std::hash`, the value does not depend on a per-process seed,
    /// so both endpoints of an edge agree on how it compares.
    pub fn stable_hash(&self) -> u64 {
        let bits = self.id.as_u128();
        (bits >> 64) as u64 ^ bits as u64
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Address {}

impl Hash for Address {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl PartialOrd for Address {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Address {
    fn cmp(&self, other: &Self) -> Ordering {
        self.id.cmp(&other.id)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.label.is_empty() {
            write!(f, "{}", self.id.simple())
        } else {
            f.write_str(&self.label)
        }
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({}:{})", self.label, self.id.simple())
    }
}
