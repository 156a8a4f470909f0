//! Solver protocols.
//!
//! A [`Solver`] is the per-node protocol state machine: it reacts to
//! messages delivered to its node and, for iterative protocols, to ticks
//! issued by the driver. Solvers never touch other nodes directly; all
//! interaction goes through the node's registry.
//!
//! | Protocol | Node | Module |
//! |----------|------|--------|
//! | CoCoA | [`Agent`](crate::agent::Agent) | [`cocoa`] |
//! | Max-Sum | `Agent` + [`FunctionNode`](crate::agent::FunctionNode) | [`max_sum`] |
//! | DSA | `Agent` | [`dsa`] |
//! | MGM | `Agent` | [`mgm`] |

pub mod cocoa;
pub mod dsa;
pub mod max_sum;
pub mod mgm;

pub use cocoa::{Cocoa, CocoaState};
pub use dsa::Dsa;
pub use max_sum::{MaxSumFunction, MaxSumVariable};
pub use mgm::Mgm;

use crate::agent::{Node, VariableOwner};
use crate::domain::Value;
use crate::error::DcopError;
use crate::messaging::Message;

/// Protocol state machine hosted by a node of type `N`.
pub trait Solver<N: Node>: Send {
    /// Protocol name for logs.
    fn name(&self) -> &'static str;

    /// One-time start.
    fn init(&mut self, node: &mut N) -> Result<(), DcopError>;

    /// React to one delivered message. Messages of other protocols are ignored.
    fn handle(&mut self, node: &mut N, message: &Message) -> Result<(), DcopError>;

    /// One iteration step. Purely message-driven protocols keep the default.
    fn tick(&mut self, _node: &mut N) -> Result<(), DcopError> {
        Ok(())
    }

    /// Return to the post-construction state.
    fn reset(&mut self);

    /// Whether the protocol has nothing left to do for now.
    fn is_done(&self, node: &N) -> bool;
}

/// Boxed solver, as stored by runners.
pub type BoxedSolver<N> = Box<dyn Solver<N>>;

// ============================================================================
// Execution policy
// ============================================================================

/// How a runner drives its solver(s).
pub enum Execution<N: Node> {
    /// One solver handles everything.
    Single(BoxedSolver<N>),
    /// `initial` seeds an assignment that `iterative` then improves.
    ///
    /// Both solvers see every message. Ticks go to `initial` until it reports
    /// done, then to `iterative`; `iterative` is never initialized so it
    /// starts from the seeded value.
    Chained {
        initial: BoxedSolver<N>,
        iterative: BoxedSolver<N>,
    },
}

impl<N: Node> Execution<N> {
    /// Single-solver policy.
    pub fn single(solver: impl Solver<N> + 'static) -> Self {
        Execution::Single(Box::new(solver))
    }

    /// Seed-then-improve policy.
    pub fn chained(initial: impl Solver<N> + 'static, iterative: impl Solver<N> + 'static) -> Self {
        Execution::Chained {
            initial: Box::new(initial),
            iterative: Box::new(iterative),
        }
    }

    /// Name for logs, e.g. `cocoa` or `cocoa+mgm`.
    pub fn name(&self) -> String {
        match self {
            Execution::Single(solver) => solver.name().to_string(),
            Execution::Chained { initial, iterative } => {
                format!("{}+{}", initial.name(), iterative.name())
            }
        }
    }

    pub fn init(&mut self, node: &mut N) -> Result<(), DcopError> {
        match self {
            Execution::Single(solver) => solver.init(node),
            Execution::Chained { initial, .. } => initial.init(node),
        }
    }

    pub fn handle(&mut self, node: &mut N, message: &Message) -> Result<(), DcopError> {
        match self {
            Execution::Single(solver) => solver.handle(node, message),
            Execution::Chained { initial, iterative } => {
                initial.handle(node, message)?;
                iterative.handle(node, message)
            }
        }
    }

    pub fn tick(&mut self, node: &mut N) -> Result<(), DcopError> {
        match self {
            Execution::Single(solver) => solver.tick(node),
            Execution::Chained { initial, iterative } => {
                if initial.is_done(node) {
                    iterative.tick(node)
                } else {
                    initial.tick(node)
                }
            }
        }
    }

    pub fn reset(&mut self) {
        match self {
            Execution::Single(solver) => solver.reset(),
            Execution::Chained { initial, iterative } => {
                initial.reset();
                iterative.reset();
            }
        }
    }

    pub fn is_done(&self, node: &N) -> bool {
        match self {
            Execution::Single(solver) => solver.is_done(node),
            Execution::Chained { initial, iterative } => {
                initial.is_done(node) && iterative.is_done(node)
            }
        }
    }
}

impl<N: Node> std::fmt::Debug for Execution<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Execution").field(&self.name()).finish()
    }
}

// ----------------------------------------------------------------------------
// Shared helpers
// ----------------------------------------------------------------------------

/// Assign a uniformly random domain value to an unset variable.
pub(crate) fn assign_random<N: VariableOwner>(
    node: &mut N,
    rng: &mut impl rand::Rng,
) -> Result<Value, DcopError> {
    let domain = node.variable().domain();
    if domain.is_empty() {
        return Err(DcopError::EmptyDomain(node.address().to_string()));
    }
    let index = rng.gen_range(0..domain.len());
    let value = domain
        .value_at(index)
        .ok_or_else(|| DcopError::EmptyDomain(node.address().to_string()))?;
    node.variable_mut().set(value.clone())?;
    Ok(value)
}

/// Uniform pick among `candidates`.
pub(crate) fn pick(candidates: &[Value], rng: &mut impl rand::Rng) -> Option<Value> {
    if candidates.is_empty() {
        return None;
    }
    Some(candidates[rng.gen_range(0..candidates.len())].clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::Agent;
    use crate::config::AgentProfile;
    use crate::domain::Domain;
    use crate::messaging::Registry;
    use crate::variable::Variable;

    /// Counts calls; done after `done_after` ticks.
    struct Counter {
        name: &'static str,
        ticks: usize,
        handled: usize,
        done_after: usize,
    }

    impl Counter {
        fn new(name: &'static str, done_after: usize) -> Self {
            Self {
                name,
                ticks: 0,
                handled: 0,
                done_after,
            }
        }
    }

    impl Solver<Agent> for Counter {
        fn name(&self) -> &'static str {
            self.name
        }
        fn init(&mut self, _node: &mut Agent) -> Result<(), DcopError> {
            Ok(())
        }
        fn handle(&mut self, _node: &mut Agent, _message: &Message) -> Result<(), DcopError> {
            self.handled += 1;
            Ok(())
        }
        fn tick(&mut self, _node: &mut Agent) -> Result<(), DcopError> {
            self.ticks += 1;
            Ok(())
        }
        fn reset(&mut self) {
            self.ticks = 0;
            self.handled = 0;
        }
        fn is_done(&self, _node: &Agent) -> bool {
            self.ticks >= self.done_after
        }
    }

    fn agent() -> Agent {
        Agent::new(
            Variable::new("x", Domain::int_range(0, 3).unwrap()),
            Registry::new(),
            AgentProfile::default(),
        )
    }

    #[test]
    fn test_chained_routes_ticks_after_initial_done() {
        let mut node = agent();
        let mut execution = Execution::chained(Counter::new("first", 2), Counter::new("second", 99));
        assert_eq!(execution.name(), "first+second");
        for _ in 0..5 {
            execution.tick(&mut node).unwrap();
        }
        execution.handle(&mut node, &Message::control("any")).unwrap();
        match &execution {
            Execution::Chained { initial, iterative } => {
                assert!(initial.is_done(&node));
                assert!(!iterative.is_done(&node));
            }
            Execution::Single(_) => unreachable!(),
        }
        assert!(!execution.is_done(&node));
    }

    #[test]
    fn test_assign_random_stays_in_domain() {
        let mut node = agent();
        let mut rng = AgentProfile::default().with_seed(7).rng();
        let value = assign_random(&mut node, &mut rng).unwrap();
        assert!(node.domain().contains(&value));
        assert_eq!(node.variable().value(), Some(&value));
        assert!(pick(&[], &mut rng).is_none());
    }
}
