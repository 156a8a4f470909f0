//! The variable-owning agent.

use crate::address::Address;
use crate::assignment::AssignmentMap;
use crate::config::AgentProfile;
use crate::constraint::ConstraintRef;
use crate::domain::{Domain, Value};
use crate::error::DcopError;
use crate::messaging::Registry;
use crate::variable::Variable;

use super::{Node, VariableOwner};

/// An autonomous unit owning one variable and the constraints attached to it.
///
/// Solvers query costs through [`Agent::local_cost_if`] and never look at the
/// constraints themselves. The agent also keeps a *view*: the last value it
/// learned for each neighbour, which is all it knows about the rest of the
/// network.
#[derive(Debug)]
pub struct Agent {
    variable: Variable,
    constraints: Vec<ConstraintRef>,
    neighbors: Vec<Address>,
    registry: Registry,
    profile: AgentProfile,
    view: AssignmentMap,
}

impl Agent {
    /// Wrap `variable`; messages go through `registry`.
    pub fn new(variable: Variable, registry: Registry, profile: AgentProfile) -> Self {
        Self {
            variable,
            constraints: Vec::new(),
            neighbors: Vec::new(),
            registry,
            profile,
            view: AssignmentMap::new(),
        }
    }

    /// Attach a constraint. Its scope must include this agent's address.
    pub fn attach(&mut self, constraint: ConstraintRef) -> Result<(), DcopError> {
        let own = self.variable.address().clone();
        if !constraint.involves(&own) {
            return Err(DcopError::ForeignConstraint {
                constraint: constraint.name().to_string(),
                agent: own,
            });
        }
        for address in constraint.involved_addresses() {
            if *address != own && !self.neighbors.contains(address) {
                self.neighbors.push(address.clone());
            }
        }
        self.constraints.push(constraint);
        Ok(())
    }

    /// Attached constraints, for drivers computing global costs.
    pub fn constraints(&self) -> &[ConstraintRef] {
        &self.constraints
    }

    /// Typed per-agent settings.
    pub fn profile(&self) -> &AgentProfile {
        &self.profile
    }

    /// Domain of the owned variable.
    pub fn domain(&self) -> &Domain {
        self.variable.domain()
    }

    /// Last known neighbour values.
    pub fn view(&self) -> &AssignmentMap {
        &self.view
    }

    /// Record a neighbour's value. Entries for the agent itself are ignored;
    /// the variable is the only source of truth for its own value.
    pub fn observe(&mut self, address: &Address, value: Value) {
        if address != self.variable.address() {
            self.view.set(address.clone(), value);
        }
    }

    /// Merge a batch of neighbour values into the view.
    pub fn observe_all(&mut self, assignment: &AssignmentMap) {
        for (address, value) in assignment.iter() {
            self.observe(address, value.clone());
        }
    }

    /// Drop what is known about a neighbour.
    pub fn forget(&mut self, address: &Address) {
        self.view.remove(address);
    }

    /// The view plus the agent's own value, if set.
    pub fn context(&self) -> AssignmentMap {
        let mut context = self.view.clone();
        if let Some(value) = self.variable.value() {
            context.set(self.variable.address().clone(), value.clone());
        }
        context
    }

    /// True cost of the attached constraints under the current value and view.
    pub fn local_cost(&self) -> Result<f64, DcopError> {
        let own = self.variable.get()?;
        let current = self.view.with(self.variable.address(), own.clone());
        let target = self.variable.address();
        self.constraints.iter().map(|c| c.cost_of(target, &current)).sum()
    }

    /// Hypothetical cost of the attached constraints under `assignment`.
    pub fn local_cost_if(&self, assignment: &AssignmentMap) -> Result<f64, DcopError> {
        let own = self.variable.address();
        self.constraints
            .iter()
            .map(|c| c.cost_if(own, assignment))
            .sum()
    }

    /// Cost of taking `value` against `base` (which is left untouched).
    pub fn local_cost_with(&self, base: &AssignmentMap, value: &Value) -> Result<f64, DcopError> {
        self.local_cost_if(&base.with(self.variable.address(), value.clone()))
    }
}

impl Node for Agent {
    fn address(&self) -> &Address {
        self.variable.address()
    }

    fn registry(&self) -> &Registry {
        &self.registry
    }

    fn neighbor_addresses(&self) -> &[Address] {
        &self.neighbors
    }

    fn is_settled(&self) -> bool {
        self.variable.is_set()
    }

    fn reset(&mut self) {
        self.variable.clear();
        self.view.clear();
    }
}

impl VariableOwner for Agent {
    fn variable(&self) -> &Variable {
        &self.variable
    }

    fn variable_mut(&mut self) -> &mut Variable {
        &mut self.variable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::{CostTable, FnConstraint};
    use std::sync::Arc;

    fn pair() -> (Agent, Agent) {
        let registry = Registry::new();
        let d = Domain::int_range(0, 1).unwrap();
        let mut a = Agent::new(Variable::new("a", d.clone()), registry.clone(), AgentProfile::root());
        let mut b = Agent::new(Variable::new("b", d.clone()), registry, AgentProfile::default());
        let neq: ConstraintRef = Arc::new(
            CostTable::inequality(
                "neq",
                (a.address().clone(), d.clone()),
                (b.address().clone(), d),
                1.0,
            )
            .unwrap(),
        );
        a.attach(neq.clone()).unwrap();
        b.attach(neq).unwrap();
        (a, b)
    }

    #[test]
    fn test_attach_rejects_foreign_constraint() {
        let (mut a, b) = pair();
        let stranger = Address::new("z");
        let foreign: ConstraintRef = Arc::new(FnConstraint::new(
            "foreign",
            vec![b.address().clone(), stranger],
            |_, _| 0.0,
        ));
        assert!(matches!(
            a.attach(foreign),
            Err(DcopError::ForeignConstraint { .. })
        ));
        assert_eq!(a.constraints().len(), 1);
    }

    #[test]
    fn test_neighbors_exclude_self_and_dedupe() {
        let (mut a, b) = pair();
        let again: ConstraintRef = Arc::new(FnConstraint::new(
            "again",
            vec![a.address().clone(), b.address().clone()],
            |_, _| 0.0,
        ));
        a.attach(again).unwrap();
        assert_eq!(a.neighbor_addresses(), &[b.address().clone()]);
    }

    #[test]
    fn test_local_cost_requires_assignment() {
        let (a, _) = pair();
        assert!(matches!(a.local_cost(), Err(DcopError::Unassigned(_))));
    }

    #[test]
    fn test_local_cost_uses_view() {
        let (mut a, b) = pair();
        a.variable_mut().set(Value::Int(0)).unwrap();
        // Neighbour unknown: the missing-scope default applies.
        assert_eq!(a.local_cost().unwrap(), 0.0);
        a.observe(b.address(), Value::Int(0));
        assert_eq!(a.local_cost().unwrap(), 1.0);
        a.forget(b.address());
        assert_eq!(a.local_cost().unwrap(), 0.0);
    }

    #[test]
    fn test_local_cost_if_is_pure() {
        let (a, b) = pair();
        let base: AssignmentMap = [(b.address().clone(), Value::Int(1))].into_iter().collect();
        assert_eq!(a.local_cost_with(&base, &Value::Int(1)).unwrap(), 1.0);
        assert_eq!(a.local_cost_with(&base, &Value::Int(0)).unwrap(), 0.0);
        assert_eq!(base.len(), 1);
        assert!(!a.variable().is_set());
    }

    #[test]
    fn test_observe_ignores_self_and_reset_clears() {
        let (mut a, b) = pair();
        let own = a.address().clone();
        a.observe(&own, Value::Int(1));
        assert!(a.view().is_empty());
        a.observe(b.address(), Value::Int(1));
        a.variable_mut().set(Value::Int(0)).unwrap();
        assert_eq!(a.context().len(), 2);
        a.reset();
        assert!(a.view().is_empty());
        assert!(!a.is_settled());
    }
}
