//! Decision variables.

use serde::{Serialize, Serializer};

use crate::address::Address;
use crate::domain::{Domain, Value};
use crate::error::DcopError;

/// A domain-constrained decision slot holding zero or one value.
///
/// A variable is owned by exactly one agent and is mutated only by that
/// agent's active solver. It is deliberately *not* serializable: peers learn
/// values through messages, never by holding a live variable.
#[derive(Debug, Clone)]
pub struct Variable {
    address: Address,
    domain: Domain,
    value: Option<Value>,
}

impl Variable {
    /// Create an unassigned variable with a freshly minted address.
    pub fn new(label: impl Into<String>, domain: Domain) -> Self {
        Self {
            address: Address::new(label),
            domain,
            value: None,
        }
    }

    /// Identity of the variable (and of its owning agent).
    pub fn address(&self) -> &Address {
        &self.address
    }

    /// The variable's domain.
    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    /// Current value; fails with [`DcopError::Unassigned`] if unset.
    pub fn get(&self) -> Result<&Value, DcopError> {
        self.value
            .as_ref()
            .ok_or_else(|| DcopError::Unassigned(self.address.clone()))
    }

    /// Current value, if any.
    pub fn value(&self) -> Option<&Value> {
        self.value.as_ref()
    }

    /// Whether a value is assigned.
    pub fn is_set(&self) -> bool {
        self.value.is_some()
    }

    /// Assign a value; rejects values outside the domain.
    pub fn set(&mut self, value: Value) -> Result<(), DcopError> {
        if !self.domain.contains(&value) {
            return Err(DcopError::OutOfDomain {
                variable: self.address.clone(),
                value,
            });
        }
        self.value = Some(value);
        Ok(())
    }

    /// Remove the value. Idempotent; returns what was there.
    pub fn clear(&mut self) -> Option<Value> {
        self.value.take()
    }
}

impl Serialize for Variable {
    fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
        Err(serde::ser::Error::custom(format!(
            "variable {} is a live reference and cannot be serialized",
            self.address
        )))
    }
}
