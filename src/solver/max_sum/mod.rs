//! Max-Sum belief propagation on the factor graph.
//!
//! Variable nodes run [`MaxSumVariable`] on an [`Agent`](crate::agent::Agent);
//! every constraint gets its own [`FunctionNode`](crate::agent::FunctionNode)
//! running [`MaxSumFunction`]. Each tick a node sends one cost message per
//! permitted edge, keyed by the receiving node's domain.
//!
//! Two optional extensions:
//!
//! - **Alternating direction**: edges are oriented by comparing the
//!   endpoints' stable hashes; a node only uses edges matching its current
//!   direction, which flips every `switch_every` ticks.
//! - **Value propagation**: after enough switches, function nodes stop
//!   minimizing over a neighbour whose value they know and fix it instead.

mod function;
mod variable;

pub use function::MaxSumFunction;
pub use variable::MaxSumVariable;

use crate::address::Address;
use crate::config::AlternatingDirection;

/// Cost message on a factor-graph edge: `{costs, value?}`.
pub const COST: &str = "maxsum.cost";

pub(crate) const COSTS_KEY: &str = "costs";
pub(crate) const VALUE_KEY: &str = "value";

/// Edge scheduling state shared by both node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    direction: Option<AlternatingDirection>,
    ticks: u64,
    switches: u64,
    forward: bool,
}

impl Schedule {
    pub fn new(direction: Option<AlternatingDirection>) -> Self {
        Self {
            direction,
            ticks: 0,
            switches: 0,
            forward: true,
        }
    }

    /// Whether `from` may send to `to` this tick.
    pub fn allows(&self, from: &Address, to: &Address) -> bool {
        match self.direction {
            None => true,
            Some(_) => (from.stable_hash() < to.stable_hash()) == self.forward,
        }
    }

    /// Count a tick, flipping direction on schedule.
    pub fn advance(&mut self) {
        self.ticks += 1;
        if let Some(ad) = self.direction {
            if ad.switch_every > 0 && self.ticks % ad.switch_every == 0 {
                self.forward = !self.forward;
                self.switches += 1;
            }
        }
    }

    /// Direction switches so far.
    pub fn switches(&self) -> u64 {
        self.switches
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}
