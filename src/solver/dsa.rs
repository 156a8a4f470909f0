//! DSA: distributed stochastic algorithm.
//!
//! Each tick an agent wakes up with probability `p`, computes its best
//! response to the neighbour values it knows, and moves according to the
//! configured [`DsaVariant`]. Value changes are broadcast.

use rand::rngs::StdRng;
use rand::Rng;

use crate::agent::{Agent, Node, VariableOwner};
use crate::assignment::{CostMap, COST_EPSILON};
use crate::config::{DsaConfig, DsaVariant};
use crate::domain::Value;
use crate::error::DcopError;
use crate::messaging::Message;

use super::{assign_random, pick, Solver};

/// Value announcement: `{value}`.
pub const VALUE: &str = "dsa.value";

const VALUE_KEY: &str = "value";

/// DSA solver for one [`Agent`].
#[derive(Debug)]
pub struct Dsa {
    config: DsaConfig,
    rng: Option<StdRng>,
    moves: usize,
}

impl Dsa {
    pub fn new(config: DsaConfig) -> Self {
        Self {
            config,
            rng: None,
            moves: 0,
        }
    }

    /// Number of value changes made by ticks.
    pub fn moves(&self) -> usize {
        self.moves
    }

    fn announce(node: &Agent, value: &Value) -> Result<(), DcopError> {
        let message = Message::new(node.address(), VALUE).with(VALUE_KEY, value)?;
        node.broadcast(&message);
        Ok(())
    }

    /// The value to move to, if the variant allows a move.
    fn best_response(&mut self, node: &Agent) -> Result<Option<Value>, DcopError> {
        let current_value = node.variable().get()?.clone();
        let current = node.local_cost()?;

        let mut costs = CostMap::new();
        for value in node.domain().iter() {
            let cost = node.local_cost_with(node.view(), &value)?;
            costs.insert(value, cost);
        }
        let Some(best) = costs.min() else {
            return Ok(None);
        };

        let improves = best < current - COST_EPSILON;
        let ties = (best - current).abs() <= COST_EPSILON;
        let allowed = improves
            || (ties
                && match self.config.variant {
                    DsaVariant::A => false,
                    DsaVariant::B => current > COST_EPSILON,
                    DsaVariant::C => true,
                });
        if !allowed {
            return Ok(None);
        }

        let candidates: Vec<Value> = costs
            .argmin()
            .into_iter()
            .filter(|v| *v != current_value)
            .collect();
        let rng = self.rng.get_or_insert_with(|| node.profile().rng());
        Ok(pick(&candidates, rng))
    }
}

impl Solver<Agent> for Dsa {
    fn name(&self) -> &'static str {
        "dsa"
    }

    fn init(&mut self, node: &mut Agent) -> Result<(), DcopError> {
        let rng = self.rng.get_or_insert_with(|| node.profile().rng());
        let value = assign_random(node, rng)?;
        Self::announce(node, &value)
    }

    fn handle(&mut self, node: &mut Agent, message: &Message) -> Result<(), DcopError> {
        if !message.is(VALUE) {
            return Ok(());
        }
        if let Some(source) = message.source() {
            let value: Value = message.get(VALUE_KEY)?;
            node.observe(source, value);
        }
        Ok(())
    }

    fn tick(&mut self, node: &mut Agent) -> Result<(), DcopError> {
        let rng = self.rng.get_or_insert_with(|| node.profile().rng());
        if rng.gen::<f64>() >= self.config.probability {
            return Ok(());
        }
        if let Some(value) = self.best_response(node)? {
            log::debug!("[DSA] {} moves to {}", node.address(), value);
            node.variable_mut().set(value.clone())?;
            self.moves += 1;
            Self::announce(node, &value)?;
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.rng = None;
        self.moves = 0;
    }

    fn is_done(&self, node: &Agent) -> bool {
        node.is_settled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgentProfile;
    use crate::constraint::{global_cost, ConstraintRef, CostTable};
    use crate::domain::Domain;
    use crate::messaging::Registry;
    use crate::runner::SolverRunner;
    use crate::solver::Execution;
    use crate::testkit::{self, Pump};
    use crate::variable::Variable;
    use std::sync::Arc;

    fn binary() -> Domain {
        Domain::int_range(0, 1).unwrap()
    }

    fn pair(registry: &Registry, seed: u64) -> (Agent, Agent, ConstraintRef) {
        let mut a = Agent::new(
            Variable::new("a", binary()),
            registry.clone(),
            AgentProfile::default().with_seed(seed),
        );
        let mut b = Agent::new(
            Variable::new("b", binary()),
            registry.clone(),
            AgentProfile::default().with_seed(seed.wrapping_mul(31).wrapping_add(7)),
        );
        let neq: ConstraintRef = Arc::new(
            CostTable::inequality(
                "neq",
                (a.address().clone(), binary()),
                (b.address().clone(), binary()),
                1.0,
            )
            .unwrap(),
        );
        a.attach(neq.clone()).unwrap();
        b.attach(neq.clone()).unwrap();
        (a, b, neq)
    }

    #[test]
    fn test_variant_a_moves_only_on_strict_improvement() {
        let registry = Registry::new();
        let (a, b, _) = pair(&registry, 3);
        let config = DsaConfig {
            probability: 1.0,
            variant: DsaVariant::A,
        };
        let mut pump = Pump::new();
        pump.add(a, Dsa::new(config));
        pump.add(b, Dsa::new(config));
        pump.init_all();
        pump.run_until_quiet(10);
        // Force a conflict, then let the agents learn about it.
        let shared = pump.node(0).variable().get().unwrap().clone();
        let other = pump.node(1).address().clone();
        pump.node_mut(1).variable_mut().set(shared.clone()).unwrap();
        pump.node_mut(0).observe(&other, shared);
        // A strict improvement exists, so variant A moves.
        pump.tick(0);
        assert_eq!(pump.solver(0).moves(), 1);
        // Now cost is zero; further ticks find only ties or worse.
        pump.run_until_quiet(10);
        pump.tick(0);
        assert_eq!(pump.solver(0).moves(), 1);
    }

    #[test]
    fn test_zero_probability_never_moves() {
        let registry = Registry::new();
        let (a, b, _) = pair(&registry, 5);
        let config = DsaConfig {
            probability: 0.0,
            variant: DsaVariant::C,
        };
        let mut pump = Pump::new();
        pump.add(a, Dsa::new(config));
        pump.add(b, Dsa::new(config));
        pump.init_all();
        for _ in 0..20 {
            pump.tick_all();
            pump.run_until_quiet(10);
        }
        assert_eq!(pump.solver(0).moves() + pump.solver(1).moves(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_two_agent_inequality_reaches_zero() {
        for rep in 0..100u64 {
            let registry = Registry::new();
            let (a, b, neq) = pair(&registry, rep);
            let runners = vec![
                SolverRunner::new(a, Execution::single(Dsa::new(DsaConfig::default()))).unwrap(),
                SolverRunner::new(b, Execution::single(Dsa::new(DsaConfig::default()))).unwrap(),
            ];
            for runner in &runners {
                runner.init().unwrap();
            }
            testkit::settle(&registry).await;
            let solved = testkit::tick_until(&registry, &runners, 200, |assignment| {
                global_cost(std::slice::from_ref(&neq), assignment).map_or(false, |c| c == 0.0)
            })
            .await;
            assert!(solved, "rep {rep} did not reach cost 0");
            testkit::shutdown_all(runners).await;
        }
    }
}
