//! Variable side of Max-Sum.

use std::collections::HashMap;

use rand::rngs::StdRng;

use crate::address::Address;
use crate::agent::{Agent, Node, VariableOwner};
use crate::assignment::CostMap;
use crate::config::MaxSumConfig;
use crate::error::DcopError;
use crate::messaging::Message;
use crate::solver::{assign_random, pick, Solver};

use super::{Schedule, COST, COSTS_KEY, VALUE_KEY};

/// Max-Sum variable node for one [`Agent`].
#[derive(Debug)]
pub struct MaxSumVariable {
    config: MaxSumConfig,
    functions: Vec<Address>,
    /// Latest function-to-variable message per function.
    received: HashMap<Address, CostMap>,
    schedule: Schedule,
    rng: Option<StdRng>,
}

impl MaxSumVariable {
    /// `functions` are the addresses of the function nodes of every
    /// constraint this variable takes part in.
    pub fn new(config: MaxSumConfig, functions: Vec<Address>) -> Self {
        Self {
            config,
            functions,
            received: HashMap::new(),
            schedule: Schedule::new(config.alternating_direction),
            rng: None,
        }
    }

    pub fn functions(&self) -> &[Address] {
        &self.functions
    }

    /// Sum of the latest incoming messages, over the own domain.
    pub fn belief(&self, node: &Agent) -> CostMap {
        self.sum_excluding(node, None)
    }

    fn sum_excluding(&self, node: &Agent, excluded: Option<&Address>) -> CostMap {
        let mut sum = CostMap::zeros(node.domain());
        for (function, costs) in &self.received {
            if Some(function) != excluded {
                sum.accumulate(costs);
            }
        }
        sum
    }
}

impl Solver<Agent> for MaxSumVariable {
    fn name(&self) -> &'static str {
        "maxsum-variable"
    }

    fn init(&mut self, node: &mut Agent) -> Result<(), DcopError> {
        let rng = self.rng.get_or_insert_with(|| node.profile().rng());
        assign_random(node, rng)?;
        Ok(())
    }

    fn handle(&mut self, node: &mut Agent, message: &Message) -> Result<(), DcopError> {
        if !message.is(COST) {
            return Ok(());
        }
        let Some(source) = message.source() else {
            return Ok(());
        };
        if !self.functions.contains(source) {
            log::debug!("[MaxSum] {} ignoring costs from unknown function {}", node.address(), source);
            return Ok(());
        }
        let costs: CostMap = message.get(COSTS_KEY)?;
        if let Some(value) = costs.first_missing(node.domain()) {
            return Err(DcopError::IncompleteCostMap {
                source_address: source.clone(),
                value,
            });
        }
        self.received.insert(source.clone(), costs);
        Ok(())
    }

    fn tick(&mut self, node: &mut Agent) -> Result<(), DcopError> {
        let current = node.variable().value().cloned();
        for function in &self.functions {
            if !self.schedule.allows(node.address(), function) {
                continue;
            }
            let mut costs = self.sum_excluding(node, Some(function));
            costs.normalize(self.config.normalization);
            let mut message = Message::new(node.address(), COST).with(COSTS_KEY, &costs)?;
            if let Some(value) = &current {
                message = message.with(VALUE_KEY, value)?;
            }
            node.send(function, message);
        }

        if !self.received.is_empty() {
            let minimizers = self.belief(node).argmin();
            let rng = self.rng.get_or_insert_with(|| node.profile().rng());
            if let Some(choice) = pick(&minimizers, rng) {
                node.variable_mut().set(choice)?;
            }
        }
        self.schedule.advance();
        Ok(())
    }

    fn reset(&mut self) {
        self.received.clear();
        self.schedule = Schedule::new(self.config.alternating_direction);
        self.rng = None;
    }

    fn is_done(&self, node: &Agent) -> bool {
        node.is_settled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assignment::{Normalization, COST_EPSILON};
    use crate::config::AgentProfile;
    use crate::domain::{Domain, Value};
    use crate::messaging::{channel, Mailbox, Registry};
    use crate::variable::Variable;

    fn setup(normalization: Normalization) -> (Agent, MaxSumVariable, Vec<(Address, Mailbox)>) {
        let registry = Registry::new();
        let functions: Vec<(Address, Mailbox)> = (0..3)
            .map(|i| {
                let address = Address::new(format!("f{i}"));
                let (inbox, mailbox) = channel(&address);
                registry.register(address.clone(), inbox).unwrap();
                (address, mailbox)
            })
            .collect();
        let agent = Agent::new(
            Variable::new("x", Domain::int_range(0, 2).unwrap()),
            registry,
            AgentProfile::default().with_seed(9),
        );
        let config = MaxSumConfig {
            normalization,
            ..MaxSumConfig::default()
        };
        let solver = MaxSumVariable::new(config, functions.iter().map(|(a, _)| a.clone()).collect());
        (agent, solver, functions)
    }

    fn costs(entries: [f64; 3]) -> CostMap {
        entries
            .iter()
            .enumerate()
            .map(|(i, c)| (Value::Int(i as i64), *c))
            .collect()
    }

    fn feed(solver: &mut MaxSumVariable, agent: &mut Agent, from: &Address, entries: [f64; 3]) {
        let message = Message::new(from, COST).with(COSTS_KEY, &costs(entries)).unwrap();
        solver.handle(agent, &message).unwrap();
    }

    #[test]
    fn test_outgoing_messages_are_min_normalized() {
        let (mut agent, mut solver, mut functions) = setup(Normalization::Min);
        solver.init(&mut agent).unwrap();
        let (f0, f1) = (functions[0].0.clone(), functions[1].0.clone());
        feed(&mut solver, &mut agent, &f0, [7.0, 3.0, 9.0]);
        feed(&mut solver, &mut agent, &f1, [4.0, 6.0, 5.0]);
        solver.tick(&mut agent).unwrap();

        for (_, mailbox) in functions.iter_mut() {
            let delivery = mailbox.try_recv().unwrap();
            let sent: CostMap = delivery.get(COSTS_KEY).unwrap();
            assert!(sent.min().unwrap().abs() < COST_EPSILON);
            assert!(delivery.payload().contains(VALUE_KEY));
        }
        // The belief [11, 9, 14] has a unique minimum at 1.
        assert_eq!(agent.variable().value(), Some(&Value::Int(1)));
    }

    #[test]
    fn test_outgoing_excludes_recipient() {
        let (mut agent, mut solver, mut functions) = setup(Normalization::Min);
        let f0 = functions[0].0.clone();
        feed(&mut solver, &mut agent, &f0, [0.0, 5.0, 1.0]);
        solver.tick(&mut agent).unwrap();
        let to_f0: CostMap = functions[0].1.try_recv().unwrap().get(COSTS_KEY).unwrap();
        assert!(to_f0.iter().all(|(_, c)| c.abs() < COST_EPSILON));
        let to_f1: CostMap = functions[1].1.try_recv().unwrap().get(COSTS_KEY).unwrap();
        assert_eq!(to_f1.get(&Value::Int(1)), Some(5.0));
        // No initial value yet: messages carry none.
        assert!(!functions[2].1.try_recv().unwrap().payload().contains(VALUE_KEY));
    }

    #[test]
    fn test_mean_normalization_centres_messages() {
        let (mut agent, mut solver, mut functions) = setup(Normalization::Mean);
        let f0 = functions[0].0.clone();
        feed(&mut solver, &mut agent, &f0, [1.0, 2.0, 6.0]);
        solver.tick(&mut agent).unwrap();
        let sent: CostMap = functions[1].1.try_recv().unwrap().get(COSTS_KEY).unwrap();
        let total: f64 = sent.iter().map(|(_, c)| c).sum();
        assert!(total.abs() < COST_EPSILON);
    }

    #[test]
    fn test_partial_cost_map_is_rejected() {
        let (mut agent, mut solver, functions) = setup(Normalization::Min);
        let f0 = functions[0].0.clone();
        let partial: CostMap = [(Value::Int(0), 1.0), (Value::Int(2), 3.0)].into_iter().collect();
        let message = Message::new(&f0, COST).with(COSTS_KEY, &partial).unwrap();
        let err = solver.handle(&mut agent, &message).unwrap_err();
        assert!(matches!(
            err,
            DcopError::IncompleteCostMap { source_address, value } if source_address == f0 && value == Value::Int(1)
        ));
        assert!(solver.belief(&agent).iter().all(|(_, c)| c == 0.0));
    }

    #[test]
    fn test_foreign_sender_ignored() {
        let (mut agent, mut solver, _functions) = setup(Normalization::Min);
        feed(&mut solver, &mut agent, &Address::new("stranger"), [1.0, 1.0, 1.0]);
        assert!(solver.belief(&agent).iter().all(|(_, c)| c == 0.0));
        solver.reset();
        assert_eq!(solver.functions().len(), 3);
    }
}
