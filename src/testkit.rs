//! Test drivers.
//!
//! [`Pump`] runs solvers without tasks: every round it snapshots every
//! mailbox, then hands the snapshot to the nodes in insertion order. Messages
//! sent during a round are delivered in the next one, so runs are fully
//! reproducible. The async helpers drive real [`SolverRunner`]s and wait for
//! the network to go quiet between steps.

use std::time::Duration;

use crate::agent::{Node, VariableOwner};
use crate::assignment::AssignmentMap;
use crate::messaging::{channel, Delivery, Mailbox, Registry};
use crate::runner::SolverRunner;
use crate::solver::Solver;

// ============================================================================
// Deterministic pump
// ============================================================================

struct Slot<N, S> {
    node: N,
    solver: S,
    mailbox: Mailbox,
}

/// Synchronous round-based driver for nodes of one kind.
pub struct Pump<N: Node, S: Solver<N>> {
    slots: Vec<Slot<N, S>>,
}

impl<N: Node, S: Solver<N>> Pump<N, S> {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Register `node` and keep its mailbox; returns its index.
    pub fn add(&mut self, node: N, solver: S) -> usize {
        let (inbox, mailbox) = channel(node.address());
        node.registry()
            .register(node.address().clone(), inbox)
            .expect("pump nodes have unique addresses");
        self.slots.push(Slot { node, solver, mailbox });
        self.slots.len() - 1
    }

    pub fn node(&self, index: usize) -> &N {
        &self.slots[index].node
    }

    pub fn node_mut(&mut self, index: usize) -> &mut N {
        &mut self.slots[index].node
    }

    pub fn solver(&self, index: usize) -> &S {
        &self.slots[index].solver
    }

    pub fn init_all(&mut self) {
        for slot in &mut self.slots {
            slot.solver.init(&mut slot.node).expect("init");
        }
    }

    pub fn tick(&mut self, index: usize) {
        let slot = &mut self.slots[index];
        slot.solver.tick(&mut slot.node).expect("tick");
    }

    pub fn tick_all(&mut self) {
        for index in 0..self.slots.len() {
            self.tick(index);
        }
    }

    /// Everything currently queued, per node.
    fn snapshot(&mut self) -> Vec<Vec<Delivery>> {
        self.slots
            .iter_mut()
            .map(|slot| std::iter::from_fn(|| slot.mailbox.try_recv()).collect())
            .collect()
    }

    fn process(&mut self, snapshot: Vec<Vec<Delivery>>) -> usize {
        let mut delivered = 0;
        for (slot, batch) in self.slots.iter_mut().zip(snapshot) {
            for delivery in batch {
                slot.solver.handle(&mut slot.node, &delivery).expect("handle");
                delivered += 1;
            }
        }
        delivered
    }

    /// Deliver one round; returns the number of messages handled.
    pub fn round(&mut self) -> usize {
        let snapshot = self.snapshot();
        self.process(snapshot)
    }

    /// Deliver rounds until one is empty. Panics after `max_rounds`.
    pub fn run_until_quiet(&mut self, max_rounds: usize) -> usize {
        for rounds in 0..max_rounds {
            if self.round() == 0 {
                return rounds;
            }
        }
        panic!("network still busy after {max_rounds} rounds");
    }
}

impl<N: VariableOwner, S: Solver<N>> Pump<N, S> {
    /// Current values of every assigned variable.
    pub fn assignment(&self) -> AssignmentMap {
        self.slots
            .iter()
            .filter_map(|slot| {
                let variable = slot.node.variable();
                variable.value().map(|v| (variable.address().clone(), v.clone()))
            })
            .collect()
    }
}

/// Deliver rounds across two pumps sharing a registry until both are quiet.
pub fn run_pair_until_quiet<A, SA, B, SB>(a: &mut Pump<A, SA>, b: &mut Pump<B, SB>, max_rounds: usize)
where
    A: Node,
    SA: Solver<A>,
    B: Node,
    SB: Solver<B>,
{
    for _ in 0..max_rounds {
        let (first, second) = (a.snapshot(), b.snapshot());
        if a.process(first) + b.process(second) == 0 {
            return;
        }
    }
    panic!("network still busy after {max_rounds} rounds");
}

// ============================================================================
// Threaded helpers
// ============================================================================

/// Wait until nothing is queued or being handled anywhere in `registry`.
pub async fn settle(registry: &Registry) {
    tokio::time::timeout(Duration::from_secs(10), registry.quiesce(Duration::from_millis(1)))
        .await
        .expect("network did not settle");
}

/// Current values of every runner's variable.
pub fn collect_assignment<N: VariableOwner>(runners: &[SolverRunner<N>]) -> AssignmentMap {
    runners
        .iter()
        .filter_map(|runner| runner.value().map(|v| (runner.address().clone(), v)))
        .collect()
}

/// Tick every runner and settle, until `done` holds or `max_ticks` elapse.
pub async fn tick_until<N: VariableOwner>(
    registry: &Registry,
    runners: &[SolverRunner<N>],
    max_ticks: usize,
    done: impl Fn(&AssignmentMap) -> bool,
) -> bool {
    settle(registry).await;
    for _ in 0..max_ticks {
        if done(&collect_assignment(runners)) {
            return true;
        }
        for runner in runners {
            runner.tick().expect("tick");
        }
        settle(registry).await;
    }
    done(&collect_assignment(runners))
}

pub async fn shutdown_all<N: Node>(runners: Vec<SolverRunner<N>>) {
    let outcomes = futures::future::join_all(runners.into_iter().map(SolverRunner::shutdown)).await;
    for outcome in outcomes {
        outcome.expect("clean shutdown");
    }
}
