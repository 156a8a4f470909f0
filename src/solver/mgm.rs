//! MGM: maximum gain message.
//!
//! Synchronous rounds driven by ticks. In each round an agent broadcasts its
//! value, waits for every neighbour's value, computes the best gain it could
//! achieve alone and broadcasts that, then moves only if its gain beats every
//! neighbour's. Since neighbours never move in the same round the global
//! cost never increases.
//!
//! Rounds are numbered; messages that arrive ahead of the local round are
//! buffered until the agent gets there.

use std::collections::{BTreeMap, HashMap};

use rand::rngs::StdRng;

use crate::address::Address;
use crate::agent::{Agent, Node, VariableOwner};
use crate::assignment::{CostMap, COST_EPSILON};
use crate::domain::Value;
use crate::error::DcopError;
use crate::messaging::Message;

use super::{assign_random, pick, Solver};

/// Round value: `{round, value}`.
pub const VALUE: &str = "mgm.value";
/// Round gain: `{round, gain}`.
pub const GAIN: &str = "mgm.gain";

const ROUND_KEY: &str = "round";
const VALUE_KEY: &str = "value";
const GAIN_KEY: &str = "gain";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Between rounds; the next tick opens one.
    Idle,
    AwaitValues,
    AwaitGains,
}

#[derive(Debug, Default)]
struct Round {
    values: HashMap<Address, Value>,
    gains: HashMap<Address, f64>,
}

/// MGM solver for one [`Agent`].
#[derive(Debug)]
pub struct Mgm {
    round: u64,
    phase: Phase,
    rounds: BTreeMap<u64, Round>,
    gain: f64,
    candidate: Option<Value>,
    moves: usize,
    rng: Option<StdRng>,
}

impl Default for Mgm {
    fn default() -> Self {
        Self::new()
    }
}

impl Mgm {
    pub fn new() -> Self {
        Self {
            round: 0,
            phase: Phase::Idle,
            rounds: BTreeMap::new(),
            gain: 0.0,
            candidate: None,
            moves: 0,
            rng: None,
        }
    }

    /// Number of completed rounds.
    pub fn completed_rounds(&self) -> u64 {
        match self.phase {
            Phase::Idle => self.round,
            _ => self.round.saturating_sub(1),
        }
    }

    /// Number of value changes made.
    pub fn moves(&self) -> usize {
        self.moves
    }

    fn buffer(&mut self, round: u64) -> &mut Round {
        self.rounds.entry(round).or_default()
    }

    /// Advance through every phase whose inputs are complete.
    fn progress(&mut self, node: &mut Agent) -> Result<(), DcopError> {
        let expected = node.neighbor_addresses().len();
        if self.phase == Phase::AwaitValues
            && self.rounds.get(&self.round).map_or(0, |r| r.values.len()) >= expected
        {
            self.compute_gain(node)?;
        }
        if self.phase == Phase::AwaitGains
            && self.rounds.get(&self.round).map_or(0, |r| r.gains.len()) >= expected
        {
            self.conclude(node)?;
        }
        Ok(())
    }

    fn compute_gain(&mut self, node: &mut Agent) -> Result<(), DcopError> {
        let values = self
            .rounds
            .get(&self.round)
            .map(|r| r.values.clone())
            .unwrap_or_default();
        for (address, value) in values {
            node.observe(&address, value);
        }

        let current = node.local_cost()?;
        let mut costs = CostMap::new();
        for value in node.domain().iter() {
            let cost = node.local_cost_with(node.view(), &value)?;
            costs.insert(value, cost);
        }
        let best = costs.min().unwrap_or(current);
        self.gain = (current - best).max(0.0);
        self.candidate = if self.gain > COST_EPSILON {
            let rng = self.rng.get_or_insert_with(|| node.profile().rng());
            pick(&costs.argmin(), rng)
        } else {
            None
        };

        if !self.gain.is_finite() {
            return Err(DcopError::NonSerializable(format!(
                "gain {} of {} is not finite",
                self.gain,
                node.address()
            )));
        }

        self.phase = Phase::AwaitGains;
        let message = Message::new(node.address(), GAIN)
            .with(ROUND_KEY, &self.round)?
            .with(GAIN_KEY, &self.gain)?;
        node.broadcast(&message);
        Ok(())
    }

    fn conclude(&mut self, node: &mut Agent) -> Result<(), DcopError> {
        let finished = self.rounds.remove(&self.round).unwrap_or_default();
        self.phase = Phase::Idle;
        let Some(candidate) = self.candidate.take() else {
            return Ok(());
        };
        let own = node.address().stable_hash();
        let wins = finished.gains.iter().all(|(peer, gain)| {
            self.gain > gain + COST_EPSILON
                || ((self.gain - gain).abs() <= COST_EPSILON && own < peer.stable_hash())
        });
        if wins {
            log::debug!(
                "[MGM] {} round {}: moves to {} (gain {})",
                node.address(),
                self.round,
                candidate,
                self.gain
            );
            node.variable_mut().set(candidate)?;
            self.moves += 1;
        }
        Ok(())
    }
}

impl Solver<Agent> for Mgm {
    fn name(&self) -> &'static str {
        "mgm"
    }

    fn init(&mut self, node: &mut Agent) -> Result<(), DcopError> {
        let rng = self.rng.get_or_insert_with(|| node.profile().rng());
        assign_random(node, rng)?;
        Ok(())
    }

    fn handle(&mut self, node: &mut Agent, message: &Message) -> Result<(), DcopError> {
        if !message.is(VALUE) && !message.is(GAIN) {
            return Ok(());
        }
        let Some(source) = message.source().cloned() else {
            return Ok(());
        };
        let round: u64 = message.get(ROUND_KEY)?;
        if round < self.round || (round == self.round && self.phase == Phase::Idle) {
            log::debug!(
                "[MGM] {} dropping stale '{}' for round {} from {}",
                node.address(),
                message.kind(),
                round,
                source
            );
            return Ok(());
        }
        if message.is(VALUE) {
            let value: Value = message.get(VALUE_KEY)?;
            self.buffer(round).values.insert(source, value);
        } else {
            let gain: f64 = message.get(GAIN_KEY)?;
            self.buffer(round).gains.insert(source, gain);
        }
        if round == self.round {
            self.progress(node)?;
        }
        Ok(())
    }

    /// Open the next round unless one is still in progress.
    fn tick(&mut self, node: &mut Agent) -> Result<(), DcopError> {
        if self.phase != Phase::Idle {
            return Ok(());
        }
        let value = node.variable().get()?.clone();
        self.round += 1;
        self.phase = Phase::AwaitValues;
        let message = Message::new(node.address(), VALUE)
            .with(ROUND_KEY, &self.round)?
            .with(VALUE_KEY, &value)?;
        node.broadcast(&message);
        self.progress(node)
    }

    fn reset(&mut self) {
        *self = Self::new();
    }

    fn is_done(&self, node: &Agent) -> bool {
        self.phase == Phase::Idle && node.is_settled()
    }
}
