//! Constraint pseudo-agent for bipartite (Max-Sum) solving.

use crate::address::Address;
use crate::assignment::AssignmentMap;
use crate::constraint::ConstraintRef;
use crate::domain::Domain;
use crate::error::DcopError;
use crate::messaging::Registry;

use super::Node;

/// One addressable node per constraint, so an n-ary constraint gets its own
/// execution context in the factor graph.
///
/// A function node knows the domains of the variables in its scope but
/// never holds their values; there is no variable accessor to misuse.
#[derive(Debug)]
pub struct FunctionNode {
    address: Address,
    constraint: ConstraintRef,
    scope: Vec<Address>,
    domains: Vec<Domain>,
    registry: Registry,
}

impl FunctionNode {
    /// Build the node for `constraint`; `domains` must name every scope address.
    pub fn new(
        constraint: ConstraintRef,
        domains: impl IntoIterator<Item = (Address, Domain)>,
        registry: Registry,
    ) -> Result<Self, DcopError> {
        let known: Vec<(Address, Domain)> = domains.into_iter().collect();
        let scope = constraint.involved_addresses().to_vec();
        let domains = scope
            .iter()
            .map(|address| {
                known
                    .iter()
                    .find(|(a, _)| a == address)
                    .map(|(_, d)| d.clone())
                    .ok_or_else(|| DcopError::MissingAssignment {
                        constraint: constraint.name().to_string(),
                        missing: address.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            address: Address::new(format!("f:{}", constraint.name())),
            constraint,
            scope,
            domains,
            registry,
        })
    }

    /// Domain of a scope member.
    pub fn domain_of(&self, address: &Address) -> Option<&Domain> {
        self.scope
            .iter()
            .position(|a| a == address)
            .map(|i| &self.domains[i])
    }

    /// Scope members with their domains, in scope order.
    pub fn scope(&self) -> impl Iterator<Item = (&Address, &Domain)> {
        self.scope.iter().zip(self.domains.iter())
    }

    /// Factor cost of the constraint under a full scope assignment.
    pub fn factor_cost(&self, assignment: &AssignmentMap) -> Result<f64, DcopError> {
        self.constraint.total_cost_if(assignment)
    }
}

impl Node for FunctionNode {
    fn address(&self) -> &Address {
        &self.address
    }

    fn registry(&self) -> &Registry {
        &self.registry
    }

    fn neighbor_addresses(&self) -> &[Address] {
        &self.scope
    }

    fn is_settled(&self) -> bool {
        true
    }

    fn reset(&mut self) {}
}
