//! Constraint evaluation interface.
//!
//! A constraint is a pure cost function over a fixed set of addresses. The
//! solvers never look inside one; they go through [`Constraint::cost_if`],
//! which enforces the scope rules:
//!
//! - evaluating for a target outside the scope is a usage error;
//! - if part of the scope is missing from the assignment, the constraint's
//!   [`MissingScope`] policy decides between a default cost and an error.
//!
//! Two generic forms are provided: [`CostTable`] (binary cost matrix) and
//! [`FnConstraint`] (n-ary closure).

use std::fmt;
use std::sync::Arc;

use crate::address::Address;
use crate::assignment::AssignmentMap;
use crate::domain::{Domain, Value};
use crate::error::DcopError;

/// Shared handle to a constraint.
pub type ConstraintRef = Arc<dyn Constraint>;

/// What a constraint contributes when part of its scope is unassigned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MissingScope {
    /// Contribute this cost (commonly zero).
    Default(f64),
    /// Fail with [`DcopError::MissingAssignment`].
    Require,
}

impl Default for MissingScope {
    fn default() -> Self {
        MissingScope::Default(0.0)
    }
}

/// A cost relationship over a fixed set of variables.
pub trait Constraint: Send + Sync + fmt::Debug {
    /// Name used in logs and errors.
    fn name(&self) -> &str;

    /// The fixed set of addresses this constraint spans.
    fn involved_addresses(&self) -> &[Address];

    /// Cost imposed on `target`; every scope address is present in `assignment`.
    fn compute(&self, target: &Address, assignment: &AssignmentMap) -> Result<f64, DcopError>;

    /// Policy for partially assigned scopes.
    fn missing_scope(&self) -> MissingScope {
        MissingScope::default()
    }

    /// Whether `address` is in scope.
    fn involves(&self, address: &Address) -> bool {
        self.involved_addresses().contains(address)
    }

    /// Hypothetical cost imposed on `target` under `assignment`.
    fn cost_if(&self, target: &Address, assignment: &AssignmentMap) -> Result<f64, DcopError> {
        if !self.involves(target) {
            return Err(DcopError::OutOfScope {
                constraint: self.name().to_string(),
                target: target.clone(),
            });
        }
        if let Some(missing) = self
            .involved_addresses()
            .iter()
            .find(|a| !assignment.contains(a))
        {
            return match self.missing_scope() {
                MissingScope::Default(cost) => Ok(cost),
                MissingScope::Require => Err(DcopError::MissingAssignment {
                    constraint: self.name().to_string(),
                    missing: missing.clone(),
                }),
            };
        }
        self.compute(target, assignment)
    }

    /// Cost imposed on `target` under the caller's current view of the assignment.
    fn cost_of(&self, target: &Address, current: &AssignmentMap) -> Result<f64, DcopError> {
        self.cost_if(target, current)
    }

    /// Sum of the costs imposed on every scope member (the factor cost).
    fn total_cost_if(&self, assignment: &AssignmentMap) -> Result<f64, DcopError> {
        self.involved_addresses()
            .iter()
            .map(|target| self.cost_if(target, assignment))
            .sum()
    }
}

/// Objective value of a full assignment: the factor cost of every constraint.
pub fn global_cost(constraints: &[ConstraintRef], assignment: &AssignmentMap) -> Result<f64, DcopError> {
    constraints.iter().map(|c| c.total_cost_if(assignment)).sum()
}

// ---------------------------------------------------------------------------
// CostTable
// ---------------------------------------------------------------------------

/// Binary constraint backed by a cost matrix.
///
/// Rows follow the first variable's domain order, columns the second's. Both
/// endpoints see the same cost.
#[derive(Debug, Clone)]
pub struct CostTable {
    name: String,
    scope: [Address; 2],
    domains: [Domain; 2],
    costs: Vec<Vec<f64>>,
    missing: MissingScope,
}

impl CostTable {
    /// Build a table; its dimensions must match both domain sizes.
    pub fn new(
        name: impl Into<String>,
        (row, row_domain): (Address, Domain),
        (col, col_domain): (Address, Domain),
        costs: Vec<Vec<f64>>,
    ) -> Result<Self, DcopError> {
        let rows = costs.len();
        let cols = costs.first().map_or(0, Vec::len);
        let ragged = costs.iter().any(|r| r.len() != cols);
        if ragged || rows != row_domain.len() || cols != col_domain.len() {
            return Err(DcopError::DimensionMismatch {
                rows,
                cols: if ragged {
                    costs.iter().map(Vec::len).max().unwrap_or(0)
                } else {
                    cols
                },
                expected_rows: row_domain.len(),
                expected_cols: col_domain.len(),
            });
        }
        Ok(Self {
            name: name.into(),
            scope: [row, col],
            domains: [row_domain, col_domain],
            costs,
            missing: MissingScope::default(),
        })
    }

    /// Table costing `penalty` when both endpoints hold the same value, else zero.
    pub fn inequality(
        name: impl Into<String>,
        a: (Address, Domain),
        b: (Address, Domain),
        penalty: f64,
    ) -> Result<Self, DcopError> {
        let costs = a
            .1
            .iter()
            .map(|x| b.1.iter().map(|y| if x == y { penalty } else { 0.0 }).collect())
            .collect();
        Self::new(name, a, b, costs)
    }

    /// Replace the missing-scope policy.
    pub fn with_missing(mut self, missing: MissingScope) -> Self {
        self.missing = missing;
        self
    }

    fn index(&self, slot: usize, value: &Value) -> Result<usize, DcopError> {
        self.domains[slot]
            .index_of(value)
            .ok_or_else(|| DcopError::OutOfDomain {
                variable: self.scope[slot].clone(),
                value: value.clone(),
            })
    }
}

impl Constraint for CostTable {
    fn name(&self) -> &str {
        &self.name
    }

    fn involved_addresses(&self) -> &[Address] {
        &self.scope
    }

    fn compute(&self, _target: &Address, assignment: &AssignmentMap) -> Result<f64, DcopError> {
        let lookup = |slot: usize| -> Result<usize, DcopError> {
            let value = assignment
                .get(&self.scope[slot])
                .ok_or_else(|| DcopError::Unassigned(self.scope[slot].clone()))?;
            self.index(slot, value)
        };
        let (r, c) = (lookup(0)?, lookup(1)?);
        Ok(self.costs[r][c])
    }

    fn missing_scope(&self) -> MissingScope {
        self.missing
    }
}

// ---------------------------------------------------------------------------
// FnConstraint
// ---------------------------------------------------------------------------

/// Cost function signature: `(target, values in scope order) -> cost`.
pub type CostFn = dyn Fn(&Address, &[&Value]) -> f64 + Send + Sync;

/// N-ary constraint defined by a closure.
#[derive(Clone)]
pub struct FnConstraint {
    name: String,
    scope: Vec<Address>,
    cost: Arc<CostFn>,
    missing: MissingScope,
}

impl FnConstraint {
    /// Build a constraint over `scope` from a cost closure.
    pub fn new(
        name: impl Into<String>,
        scope: Vec<Address>,
        cost: impl Fn(&Address, &[&Value]) -> f64 + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            scope,
            cost: Arc::new(cost),
            missing: MissingScope::default(),
        }
    }

    /// Replace the missing-scope policy.
    pub fn with_missing(mut self, missing: MissingScope) -> Self {
        self.missing = missing;
        self
    }
}

impl fmt::Debug for FnConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnConstraint")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("missing", &self.missing)
            .finish()
    }
}

impl Constraint for FnConstraint {
    fn name(&self) -> &str {
        &self.name
    }

    fn involved_addresses(&self) -> &[Address] {
        &self.scope
    }

    fn compute(&self, target: &Address, assignment: &AssignmentMap) -> Result<f64, DcopError> {
        let values = self
            .scope
            .iter()
            .map(|a| assignment.get(a).ok_or_else(|| DcopError::Unassigned(a.clone())))
            .collect::<Result<Vec<_>, _>>()?;
        Ok((self.cost)(target, &values))
    }

    fn missing_scope(&self) -> MissingScope {
        self.missing
    }
}
