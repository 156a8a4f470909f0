//! Candidate assignments and per-value cost tables.
//!
//! [`AssignmentMap`] is the scratch what-if context solvers evaluate costs
//! against; [`CostMap`] is the unit neighbours exchange. Both serialize as
//! ordered lists of pairs so they travel inside JSON payloads.

use std::collections::BTreeMap;

use serde::ser::{Error as _, SerializeSeq};
use serde::{Deserialize, Serialize, Serializer};

use crate::address::Address;
use crate::domain::{Domain, Value};

/// Two costs closer than this are treated as a tie.
pub const COST_EPSILON: f64 = 1e-9;

// ---------------------------------------------------------------------------
// AssignmentMap
// ---------------------------------------------------------------------------

/// A (partial) candidate global assignment: at most one value per address.
///
/// Speculative evaluation goes through [`AssignmentMap::with`], which clones
/// before inserting, so a shared context is never corrupted by a what-if.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<(Address, Value)>", into = "Vec<(Address, Value)>")]
pub struct AssignmentMap {
    entries: BTreeMap<Address, Value>,
}

impl AssignmentMap {
    /// An empty assignment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign `value` to `address`, returning the previous value.
    pub fn set(&mut self, address: Address, value: Value) -> Option<Value> {
        self.entries.insert(address, value)
    }

    /// Value assigned to `address`.
    pub fn get(&self, address: &Address) -> Option<&Value> {
        self.entries.get(address)
    }

    /// Remove the entry for `address`, returning it.
    pub fn remove(&mut self, address: &Address) -> Option<Value> {
        self.entries.remove(address)
    }

    /// Whether `address` has an entry.
    pub fn contains(&self, address: &Address) -> bool {
        self.entries.contains_key(address)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Iterate entries in address order.
    pub fn iter(&self) -> impl Iterator<Item = (&Address, &Value)> {
        self.entries.iter()
    }

    /// A copy of this map with one extra (or replaced) entry.
    pub fn with(&self, address: &Address, value: Value) -> Self {
        let mut copy = self.clone();
        copy.set(address.clone(), value);
        copy
    }

    /// Copy every entry of `other` into `self`; `other` wins on conflicts.
    pub fn merge(&mut self, other: &AssignmentMap) {
        for (address, value) in other.iter() {
            self.entries.insert(address.clone(), value.clone());
        }
    }
}

impl From<Vec<(Address, Value)>> for AssignmentMap {
    fn from(pairs: Vec<(Address, Value)>) -> Self {
        Self {
            entries: pairs.into_iter().collect(),
        }
    }
}

impl From<AssignmentMap> for Vec<(Address, Value)> {
    fn from(map: AssignmentMap) -> Self {
        map.entries.into_iter().collect()
    }
}

impl FromIterator<(Address, Value)> for AssignmentMap {
    fn from_iter<I: IntoIterator<Item = (Address, Value)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Normalization
// ---------------------------------------------------------------------------

/// Constant subtracted from every entry of an outgoing Max-Sum message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
    /// Subtract the minimum entry; the smallest entry becomes zero.
    #[default]
    Min,
    /// Subtract the mean entry; entries sum to zero.
    Mean,
}

// ---------------------------------------------------------------------------
// CostMap
// ---------------------------------------------------------------------------

/// Mapping from candidate value to cost.
///
/// A map produced for a requester must cover every value of the requester's
/// domain; [`CostMap::first_missing`] checks that. Only finite costs
/// serialize: JSON has no encoding for infinities or NaN.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "Vec<(Value, f64)>")]
pub struct CostMap {
    entries: BTreeMap<Value, f64>,
}

impl CostMap {
    /// An empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// A map assigning zero to every value of `domain`.
    pub fn zeros(domain: &Domain) -> Self {
        domain.iter().map(|v| (v, 0.0)).collect()
    }

    /// Set the cost of `value`.
    pub fn insert(&mut self, value: Value, cost: f64) -> Option<f64> {
        self.entries.insert(value, cost)
    }

    /// Cost of `value`.
    pub fn get(&self, value: &Value) -> Option<f64> {
        self.entries.get(value).copied()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in value order.
    pub fn iter(&self) -> impl Iterator<Item = (&Value, f64)> {
        self.entries.iter().map(|(v, c)| (v, *c))
    }

    /// First value of `domain` this map has no entry for.
    pub fn first_missing(&self, domain: &Domain) -> Option<Value> {
        domain.iter().find(|v| !self.entries.contains_key(v))
    }

    /// Smallest cost, if any.
    pub fn min(&self) -> Option<f64> {
        self.entries.values().copied().reduce(f64::min)
    }

    /// Every value whose cost is within [`COST_EPSILON`] of the minimum.
    pub fn argmin(&self) -> Vec<Value> {
        let Some(min) = self.min() else {
            return Vec::new();
        };
        self.entries
            .iter()
            .filter(|(_, c)| **c - min <= COST_EPSILON)
            .map(|(v, _)| v.clone())
            .collect()
    }

    /// Add `other` entry-wise; values absent from `self` are inserted.
    pub fn accumulate(&mut self, other: &CostMap) {
        for (value, cost) in other.iter() {
            *self.entries.entry(value.clone()).or_insert(0.0) += cost;
        }
    }

    /// Subtract the normalizing constant from every entry and return it.
    ///
    /// The ordering of entries, and therefore the arg-min, is unchanged.
    pub fn normalize(&mut self, mode: Normalization) -> f64 {
        if self.entries.is_empty() {
            return 0.0;
        }
        let constant = match mode {
            Normalization::Min => self.min().unwrap_or(0.0),
            Normalization::Mean => {
                self.entries.values().sum::<f64>() / self.entries.len() as f64
            }
        };
        for cost in self.entries.values_mut() {
            *cost -= constant;
        }
        constant
    }
}

impl From<Vec<(Value, f64)>> for CostMap {
    fn from(pairs: Vec<(Value, f64)>) -> Self {
        Self {
            entries: pairs.into_iter().collect(),
        }
    }
}

impl From<CostMap> for Vec<(Value, f64)> {
    fn from(map: CostMap) -> Self {
        map.entries.into_iter().collect()
    }
}

impl Serialize for CostMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.entries.len()))?;
        for (value, cost) in &self.entries {
            if !cost.is_finite() {
                return Err(S::Error::custom(format!("cost {cost} for {value} is not finite")));
            }
            seq.serialize_element(&(value, cost))?;
        }
        seq.end()
    }
}

impl FromIterator<(Value, f64)> for CostMap {
    fn from_iter<I: IntoIterator<Item = (Value, f64)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
