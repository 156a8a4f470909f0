//! Function side of Max-Sum.

use std::collections::HashMap;

use crate::address::Address;
use crate::agent::{FunctionNode, Node};
use crate::assignment::{AssignmentMap, CostMap};
use crate::config::MaxSumConfig;
use crate::domain::Value;
use crate::error::DcopError;
use crate::messaging::Message;
use crate::solver::Solver;

use super::{Schedule, COST, COSTS_KEY, VALUE_KEY};

/// Max-Sum function node for one [`FunctionNode`].
#[derive(Debug)]
pub struct MaxSumFunction {
    config: MaxSumConfig,
    /// Latest variable-to-function message per variable.
    received: HashMap<Address, CostMap>,
    /// Values variables reported alongside their messages.
    known: HashMap<Address, Value>,
    schedule: Schedule,
}

impl MaxSumFunction {
    pub fn new(config: MaxSumConfig) -> Self {
        Self {
            config,
            received: HashMap::new(),
            known: HashMap::new(),
            schedule: Schedule::new(config.alternating_direction),
        }
    }

    fn propagating(&self) -> bool {
        self.config
            .value_propagation
            .map_or(false, |vp| self.schedule.switches() >= vp.after_switches)
    }

    /// Cost message for `target`, keyed by its domain.
    pub fn message_for(&self, node: &FunctionNode, target: &Address) -> Result<CostMap, DcopError> {
        let domain = node.domain_of(target).ok_or_else(|| DcopError::OutOfScope {
            constraint: node.address().to_string(),
            target: target.clone(),
        })?;
        let propagating = self.propagating();
        let others: Vec<(Address, Vec<Value>)> = node
            .scope()
            .filter(|(address, _)| *address != target)
            .map(|(address, domain)| {
                let values = match self.known.get(address) {
                    Some(value) if propagating => vec![value.clone()],
                    _ => domain.values(),
                };
                (address.clone(), values)
            })
            .collect();

        let mut costs = CostMap::new();
        let mut assignment = AssignmentMap::new();
        for value in domain.iter() {
            assignment.set(target.clone(), value.clone());
            let best = self.minimize(node, &others, &mut assignment)?;
            costs.insert(value, best);
        }
        Ok(costs)
    }

    /// Minimum over every joint assignment of `others` of the factor cost plus
    /// their incoming messages.
    fn minimize(
        &self,
        node: &FunctionNode,
        others: &[(Address, Vec<Value>)],
        assignment: &mut AssignmentMap,
    ) -> Result<f64, DcopError> {
        let Some(((address, values), rest)) = others.split_first() else {
            return node.factor_cost(assignment);
        };
        let incoming = self.received.get(address);
        let mut best = f64::INFINITY;
        for value in values {
            let q = incoming.and_then(|costs| costs.get(value)).unwrap_or(0.0);
            assignment.set(address.clone(), value.clone());
            best = best.min(q + self.minimize(node, rest, assignment)?);
        }
        assignment.remove(address);
        Ok(best)
    }
}

impl Solver<FunctionNode> for MaxSumFunction {
    fn name(&self) -> &'static str {
        "maxsum-function"
    }

    fn init(&mut self, _node: &mut FunctionNode) -> Result<(), DcopError> {
        Ok(())
    }

    fn handle(&mut self, node: &mut FunctionNode, message: &Message) -> Result<(), DcopError> {
        if !message.is(COST) {
            return Ok(());
        }
        let Some(source) = message.source() else {
            return Ok(());
        };
        let Some(domain) = node.domain_of(source) else {
            log::debug!("[MaxSum] {} ignoring costs from {} outside its scope", node.address(), source);
            return Ok(());
        };
        let costs: CostMap = message.get(COSTS_KEY)?;
        if let Some(value) = costs.first_missing(domain) {
            return Err(DcopError::IncompleteCostMap {
                source_address: source.clone(),
                value,
            });
        }
        self.received.insert(source.clone(), costs);
        if let Some(value) = message.payload().get_opt::<Value>(VALUE_KEY)? {
            self.known.insert(source.clone(), value);
        }
        Ok(())
    }

    fn tick(&mut self, node: &mut FunctionNode) -> Result<(), DcopError> {
        for target in node.neighbor_addresses() {
            if !self.schedule.allows(node.address(), target) {
                continue;
            }
            let costs = self.message_for(node, target)?;
            node.send(target, Message::new(node.address(), COST).with(COSTS_KEY, &costs)?);
        }
        self.schedule.advance();
        Ok(())
    }

    fn reset(&mut self) {
        self.received.clear();
        self.known.clear();
        self.schedule = Schedule::new(self.config.alternating_direction);
    }

    fn is_done(&self, _node: &FunctionNode) -> bool {
        true
    }
}
