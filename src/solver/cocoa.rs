//! CoCoA: cooperative constraint approximation.
//!
//! A single-pass, non-iterative protocol. Agents are activated one at a
//! time along the constraint graph; an activated agent asks every
//! neighbour what each of its own values would cost them, then commits to
//! the cheapest value. If the cheapest value is not unique enough (more
//! tied minimizers than the current uniqueness bound) while a neighbour is
//! itself deciding, the agent holds back and retries later.
//!
//! State machine:
//!
//! ```text
//!   IDLE ──activate──▶ ACTIVE ──unique──▶ DONE
//!                        │  ▲                │
//!                   ties │  │ neighbour DONE │ activate (reopen)
//!                        ▼  │ or escalation  ▼
//!                        HOLD             ACTIVE
//! ```
//!
//! Two neighbours holding on each other with nobody else deciding would
//! wait forever; each of them raises its uniqueness bound and re-inquires.

use std::collections::HashMap;

use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::agent::{Agent, Node, VariableOwner};
use crate::assignment::{AssignmentMap, CostMap};
use crate::config::CocoaConfig;
use crate::domain::{Domain, Value};
use crate::error::DcopError;
use crate::messaging::Message;

use super::{pick, Solver};

/// Ask neighbours for costs: `{context, domain}`.
pub const INQUIRE: &str = "cocoa.inquire";
/// Reply to an inquiry: `{costs}` keyed by the requester's values.
pub const COST: &str = "cocoa.cost";
/// State announcement: `{state, value?}`.
pub const STATE: &str = "cocoa.state";
/// Wake a neighbour up.
pub const ACTIVATE: &str = "cocoa.activate";

const CONTEXT: &str = "context";
const DOMAIN: &str = "domain";
const COSTS: &str = "costs";
const STATE_KEY: &str = "state";
const VALUE: &str = "value";

/// Per-agent CoCoA state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CocoaState {
    #[default]
    Idle,
    Active,
    Hold,
    Done,
}

/// CoCoA solver for one [`Agent`].
#[derive(Debug)]
pub struct Cocoa {
    config: CocoaConfig,
    state: CocoaState,
    bound: usize,
    escalations: usize,
    /// Last state each neighbour was seen in.
    peers: HashMap<Address, CocoaState>,
    /// Cost replies of the current inquiry, by sender.
    replies: HashMap<Address, CostMap>,
    rng: Option<StdRng>,
}

impl Cocoa {
    pub fn new(config: CocoaConfig) -> Self {
        Self {
            config,
            state: CocoaState::Idle,
            bound: config.initial_uniqueness_bound,
            escalations: 0,
            peers: HashMap::new(),
            replies: HashMap::new(),
            rng: None,
        }
    }

    /// Current protocol state.
    pub fn state(&self) -> CocoaState {
        self.state
    }

    /// Tied minimizers tolerated before holding.
    pub fn uniqueness_bound(&self) -> usize {
        self.bound
    }

    /// How many times the bound was raised to break a HOLD/HOLD standoff.
    pub fn escalations(&self) -> usize {
        self.escalations
    }

    /// Last state seen for `peer`; IDLE if never heard from.
    pub fn peer_state(&self, peer: &Address) -> CocoaState {
        self.peers.get(peer).copied().unwrap_or_default()
    }

    fn any_peer_active(&self, node: &Agent) -> bool {
        node.neighbor_addresses()
            .iter()
            .any(|n| self.peer_state(n) == CocoaState::Active)
    }

    // ------------------------------------------------------------------
    // Transitions
    // ------------------------------------------------------------------

    fn activate(&mut self, node: &mut Agent) -> Result<(), DcopError> {
        if self.state == CocoaState::Active {
            log::debug!("[CoCoA] {} already active; ignoring activation", node.address());
            return Ok(());
        }
        log::debug!(
            "[CoCoA] {} {:?} -> ACTIVE (bound {})",
            node.address(),
            self.state,
            self.bound
        );
        self.state = CocoaState::Active;
        self.replies.clear();
        if node.neighbor_addresses().is_empty() {
            return self.decide(node);
        }
        let inquire = Message::new(node.address(), INQUIRE)
            .with(CONTEXT, &node.context())?
            .with(DOMAIN, node.domain())?;
        node.broadcast(&inquire);
        Ok(())
    }

    fn on_inquire(&mut self, node: &mut Agent, source: &Address, message: &Message) -> Result<(), DcopError> {
        self.peers.insert(source.clone(), CocoaState::Active);
        let context: AssignmentMap = message.get(CONTEXT)?;
        let requested: Domain = message.get(DOMAIN)?;
        node.observe_all(&context);

        let own = node.variable().value().cloned();
        let mut costs = CostMap::new();
        for value in requested.iter() {
            let base = node.view().with(source, value.clone());
            let cost = match &own {
                Some(own) => node.local_cost_with(&base, own)?,
                None => cheapest(node, &base)?,
            };
            costs.insert(value, cost);
        }
        let reply = Message::new(node.address(), COST).with(COSTS, &costs)?;
        node.send(source, reply);
        Ok(())
    }

    fn on_cost(&mut self, node: &mut Agent, source: &Address, message: &Message) -> Result<(), DcopError> {
        if self.state != CocoaState::Active {
            log::debug!(
                "[CoCoA] {} ignoring cost reply from {} while {:?}",
                node.address(),
                source,
                self.state
            );
            return Ok(());
        }
        if !node.neighbor_addresses().contains(source) {
            return Ok(());
        }
        let costs: CostMap = message.get(COSTS)?;
        self.replies.insert(source.clone(), costs);
        let complete = node
            .neighbor_addresses()
            .iter()
            .all(|n| self.replies.contains_key(n));
        if complete {
            self.decide(node)?;
        }
        Ok(())
    }

    fn decide(&mut self, node: &mut Agent) -> Result<(), DcopError> {
        let mut totals = CostMap::new();
        for value in node.domain().iter() {
            let mut total = node.local_cost_with(node.view(), &value)?;
            for neighbor in node.neighbor_addresses() {
                let cost = self
                    .replies
                    .get(neighbor)
                    .and_then(|reply| reply.get(&value))
                    .ok_or_else(|| DcopError::IncompleteCostMap {
                        source_address: neighbor.clone(),
                        value: value.clone(),
                    })?;
                total += cost;
            }
            totals.insert(value, total);
        }
        self.replies.clear();

        let minimizers = totals.argmin();
        if minimizers.len() > self.bound && self.any_peer_active(node) {
            log::debug!(
                "[CoCoA] {} -> HOLD ({} ties > bound {})",
                node.address(),
                minimizers.len(),
                self.bound
            );
            self.state = CocoaState::Hold;
            node.broadcast(&announce(node, CocoaState::Hold, None)?);
            return Ok(());
        }

        let rng = self.rng.get_or_insert_with(|| node.profile().rng());
        let choice = pick(&minimizers, rng).ok_or_else(|| DcopError::EmptyDomain(node.address().to_string()))?;
        node.variable_mut().set(choice.clone())?;
        self.state = CocoaState::Done;
        log::debug!("[CoCoA] {} -> DONE with {}", node.address(), choice);
        node.broadcast(&announce(node, CocoaState::Done, Some(&choice))?);
        self.activate_next(node);
        Ok(())
    }

    /// Wake the first neighbour not known to be deciding or decided.
    fn activate_next(&self, node: &Agent) {
        let next = node
            .neighbor_addresses()
            .iter()
            .find(|n| !matches!(self.peer_state(n), CocoaState::Active | CocoaState::Done));
        if let Some(next) = next {
            node.send(next, Message::new(node.address(), ACTIVATE));
        }
    }

    fn on_state(&mut self, node: &mut Agent, source: &Address, message: &Message) -> Result<(), DcopError> {
        let announced: CocoaState = message.get(STATE_KEY)?;
        let value: Option<Value> = message.payload().get_opt(VALUE)?;
        self.peers.insert(source.clone(), announced);
        if let Some(value) = value {
            node.observe(source, value);
        }

        match (self.state, announced) {
            (CocoaState::Hold, CocoaState::Hold) if !self.any_peer_active(node) => {
                self.bound += 1;
                self.escalations += 1;
                log::debug!(
                    "[CoCoA] {} and {} both holding; bound raised to {}",
                    node.address(),
                    source,
                    self.bound
                );
                self.activate(node)
            }
            (CocoaState::Hold, CocoaState::Done) => self.activate(node),
            (CocoaState::Done, CocoaState::Done) => {
                self.activate_next(node);
                Ok(())
            }
            _ => Ok(()),
        }
    }
}

/// Cheapest own cost against `base`, over the whole own domain.
fn cheapest(node: &Agent, base: &AssignmentMap) -> Result<f64, DcopError> {
    let mut best = f64::INFINITY;
    for value in node.domain().iter() {
        best = best.min(node.local_cost_with(base, &value)?);
    }
    Ok(best)
}

fn announce(node: &Agent, state: CocoaState, value: Option<&Value>) -> Result<Message, DcopError> {
    let message = Message::new(node.address(), STATE).with(STATE_KEY, &state)?;
    match value {
        Some(value) => message.with(VALUE, value),
        None => Ok(message),
    }
}

impl Solver<Agent> for Cocoa {
    fn name(&self) -> &'static str {
        "cocoa"
    }

    fn init(&mut self, node: &mut Agent) -> Result<(), DcopError> {
        if node.profile().is_root {
            self.activate(node)?;
        }
        Ok(())
    }

    fn handle(&mut self, node: &mut Agent, message: &Message) -> Result<(), DcopError> {
        if message.is(ACTIVATE) {
            return self.activate(node);
        }
        let Some(source) = message.source().cloned() else {
            return Ok(());
        };
        match message.kind() {
            INQUIRE => self.on_inquire(node, &source, message),
            COST => self.on_cost(node, &source, message),
            STATE => self.on_state(node, &source, message),
            _ => Ok(()),
        }
    }

    fn reset(&mut self) {
        *self = Self::new(self.config);
    }

    fn is_done(&self, _node: &Agent) -> bool {
        self.state == CocoaState::Done
    }
}
