//! Error types for the constraint-optimization substrate and its protocols.
//!
//! Protocol-usage mistakes (reading an unset variable, evaluating a
//! constraint for an address outside its scope, attaching a foreign
//! constraint) fail fast: a silently defaulted value would corrupt a cost
//! computation without any visible symptom. Domain and range problems are
//! detected eagerly, at construction. Undeliverable sends are *not* errors;
//! the registry logs them and reports `false`.

use thiserror::Error;

use crate::address::Address;
use crate::domain::Value;

/// Errors raised by variables, constraints, messaging, runners and solvers.
#[derive(Debug, Error)]
pub enum DcopError {
    /// A variable was read before any value was assigned.
    #[error("Variable {0} has no assignment")]
    Unassigned(Address),

    /// A value outside the variable's domain was assigned.
    #[error("Value {value} is not in the domain of {variable}")]
    OutOfDomain { variable: Address, value: Value },

    /// A constraint was evaluated for an address it does not span.
    #[error("Address {target} is outside the scope of constraint {constraint}")]
    OutOfScope { constraint: String, target: Address },

    /// A constraint was attached to an agent whose variable it does not involve.
    #[error("Constraint {constraint} does not involve agent {agent}")]
    ForeignConstraint { constraint: String, agent: Address },

    /// A constraint that requires a full scope was evaluated without one.
    #[error("Constraint {constraint} requires an assignment for {missing}")]
    MissingAssignment { constraint: String, missing: Address },

    /// A cost map does not cover every value of the domain it was built for.
    #[error("Cost map from {source_address} does not cover value {value}")]
    IncompleteCostMap { source_address: Address, value: Value },

    /// Cost-table dimensions disagree with the variables' domain sizes.
    #[error("Cost table is {rows}x{cols} but the domains have sizes {expected_rows}x{expected_cols}")]
    DimensionMismatch {
        rows: usize,
        cols: usize,
        expected_rows: usize,
        expected_cols: usize,
    },

    /// A domain would contain no values.
    #[error("Domain error: {0}")]
    EmptyDomain(String),

    /// A fixed-precision decimal asked for more decimal places than supported.
    #[error("Fixed-precision scale {0} exceeds the maximum of 18")]
    ScaleOverflow(u8),

    /// Domain iteration was advanced past its last value.
    #[error("Domain iteration exhausted")]
    DomainExhausted,

    /// A value refused to serialize into a message payload.
    #[error("Value is not serializable: {0}")]
    NonSerializable(String),

    /// A payload entry could not be decoded into the requested type.
    #[error("Payload error for key '{key}': {message}")]
    Payload { key: String, message: String },

    /// A required payload entry is absent.
    #[error("Payload has no entry '{0}'")]
    MissingField(String),

    /// An address was bound to a second inbox.
    #[error("Address {0} is already registered")]
    AlreadyRegistered(Address),

    /// A runner was constructed outside a Tokio runtime.
    #[error("No Tokio runtime is available to host the solver task")]
    NoRuntime,

    /// Configuration validation failed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// YAML parsing failed.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON parsing failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_address() {
        let address = Address::new("x1");
        let err = DcopError::Unassigned(address.clone());
        assert!(err.to_string().contains("x1"));

        let err = DcopError::OutOfDomain {
            variable: address,
            value: Value::Int(7),
        };
        assert!(err.to_string().contains('7'));
    }

    #[test]
    fn test_dimension_mismatch_message() {
        let err = DcopError::DimensionMismatch {
            rows: 2,
            cols: 3,
            expected_rows: 2,
            expected_cols: 2,
        };
        assert_eq!(
            err.to_string(),
            "Cost table is 2x3 but the domains have sizes 2x2"
        );
    }
}
