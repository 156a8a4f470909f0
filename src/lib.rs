//! # dcop-actors
//!
//! Asynchronous distributed constraint optimization on an in-process actor
//! substrate.
//!
//! Every decision variable is owned by an [`Agent`]; agents talk only by
//! message passing through a shared [`Registry`], each on its own Tokio task
//! hosted by a [`SolverRunner`]. Four protocols are provided:
//!
//! - [`Cocoa`]: single-pass cooperative assignment with uniqueness-bound
//!   escalation;
//! - [`MaxSumVariable`] / [`MaxSumFunction`]: belief propagation on the factor
//!   graph, with optional alternating direction and value propagation;
//! - [`Dsa`] and [`Mgm`]: classic local-search baselines.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use dcop_actors::{
//!     Agent, AgentProfile, Cocoa, CocoaConfig, ConstraintRef, CostTable, Domain, Execution,
//!     Registry, SolverRunner, Variable, VariableOwner,
//! };
//!
//! # async fn demo() -> Result<(), dcop_actors::DcopError> {
//! let registry = Registry::new();
//! let colours = Domain::int_range(0, 1)?;
//! let mut a = Agent::new(Variable::new("a", colours.clone()), registry.clone(), AgentProfile::root());
//! let mut b = Agent::new(Variable::new("b", colours.clone()), registry.clone(), AgentProfile::default());
//! let differ: ConstraintRef = Arc::new(CostTable::inequality(
//!     "a!=b",
//!     (a.variable().address().clone(), colours.clone()),
//!     (b.variable().address().clone(), colours),
//!     1.0,
//! )?);
//! a.attach(differ.clone())?;
//! b.attach(differ)?;
//!
//! let runners = [
//!     SolverRunner::new(a, Execution::single(Cocoa::new(CocoaConfig::default())))?,
//!     SolverRunner::new(b, Execution::single(Cocoa::new(CocoaConfig::default())))?,
//! ];
//! for runner in &runners {
//!     runner.init()?;
//! }
//! registry.quiesce(std::time::Duration::from_millis(1)).await;
//! # Ok(())
//! # }
//! ```

pub mod address;
pub mod agent;
pub mod assignment;
pub mod config;
pub mod constraint;
pub mod domain;
pub mod error;
pub mod messaging;
pub mod runner;
pub mod solver;
pub mod telemetry;
pub mod variable;

#[cfg(test)]
mod testkit;

pub use address::Address;
pub use agent::{Agent, FunctionNode, Node, VariableOwner};
pub use assignment::{AssignmentMap, CostMap, Normalization, COST_EPSILON};
pub use config::{
    AgentProfile, AlternatingDirection, CocoaConfig, DcopConfig, DsaConfig, DsaVariant, MaxSumConfig,
    RunnerConfig, ValuePropagation,
};
pub use constraint::{global_cost, Constraint, ConstraintRef, CostTable, FnConstraint, MissingScope};
pub use domain::{Domain, Fixed, Value, MAX_SCALE};
pub use error::DcopError;
pub use messaging::{Message, Payload, Registry};
pub use runner::SolverRunner;
pub use solver::{Cocoa, CocoaState, Dsa, Execution, MaxSumFunction, MaxSumVariable, Mgm, Solver};
pub use variable::Variable;

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
