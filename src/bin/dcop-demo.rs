//! Graph-colouring demo.
//!
//! Builds a ring of agents with chords, three colours per agent and a unit
//! penalty for equal neighbours, solves it with the chosen protocol and logs
//! the resulting cost.
//!
//! # Environment Variables
//!
//! - `DCOP_CONFIG`: YAML experiment configuration (default: built-in defaults)
//! - `DCOP_PROTOCOL`: `cocoa` (default), `dsa`, `mgm`, `cocoa+mgm`, `cocoa+dsa` or `maxsum`
//! - `DCOP_AGENTS`: number of agents (default: 8)
//! - `DCOP_TICKS`: iterations for iterative protocols (default: 30)
//! - `RUST_LOG`: tracing filter (default: "info")
//!
//! # Usage
//!
//! ```bash
//! DCOP_PROTOCOL=cocoa+mgm cargo run --bin dcop-demo
//! ```

use std::sync::Arc;
use std::time::Duration;

use dcop_actors::telemetry::init_logging;
use dcop_actors::{
    global_cost, Agent, AgentProfile, AssignmentMap, Cocoa, ConstraintRef, CostTable, DcopConfig, DcopError,
    Domain, Dsa, Execution, FunctionNode, MaxSumFunction, MaxSumVariable, Mgm, Node, Registry, SolverRunner,
    Variable,
};

const POLL: Duration = Duration::from_millis(1);

#[tokio::main]
async fn main() {
    init_logging("info");
    if let Err(err) = run().await {
        tracing::error!("demo failed: {}", err);
        std::process::exit(1);
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T, DcopError> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| DcopError::Config(format!("{key} has an invalid value '{raw}'"))),
        Err(_) => Ok(default),
    }
}

async fn run() -> Result<(), DcopError> {
    let config = match std::env::var("DCOP_CONFIG") {
        Ok(path) => DcopConfig::from_yaml_file(path)?,
        Err(_) => DcopConfig::default(),
    };
    let protocol: String = env_or("DCOP_PROTOCOL", "cocoa".to_string())?;
    let size: usize = env_or("DCOP_AGENTS", 8)?;
    let ticks: usize = env_or("DCOP_TICKS", 30)?;
    if size < 3 {
        return Err(DcopError::Config("DCOP_AGENTS must be at least 3".to_string()));
    }

    let registry = Registry::new();
    let colours = Domain::int_range(0, 2)?;
    let (agents, constraints) = colouring(&registry, &colours, size)?;
    tracing::info!(
        "Solving {} agents / {} constraints with {}",
        agents.len(),
        constraints.len(),
        protocol
    );

    let assignment = if protocol == "maxsum" {
        solve_max_sum(&registry, &config, agents, &constraints, &colours, ticks).await?
    } else {
        solve_local(&registry, &config, &protocol, agents, ticks).await?
    };
    let cost = global_cost(&constraints, &assignment)?;
    tracing::info!("Final cost {} ({} of {} variables assigned)", cost, assignment.len(), size);
    Ok(())
}

/// Ring plus chords between every other agent.
fn colouring(
    registry: &Registry,
    colours: &Domain,
    size: usize,
) -> Result<(Vec<Agent>, Vec<ConstraintRef>), DcopError> {
    let mut agents: Vec<Agent> = (0..size)
        .map(|i| {
            let profile = if i == 0 { AgentProfile::root() } else { AgentProfile::default() };
            Agent::new(Variable::new(format!("v{i}"), colours.clone()), registry.clone(), profile)
        })
        .collect();
    let edges = (0..size)
        .map(|i| (i, (i + 1) % size))
        .chain((0..size).step_by(2).map(|i| (i, (i + 2) % size)))
        .filter(|(i, j)| i != j);

    let mut constraints = Vec::new();
    for (i, j) in edges {
        let constraint: ConstraintRef = Arc::new(CostTable::inequality(
            format!("v{i}!=v{j}"),
            (agents[i].address().clone(), colours.clone()),
            (agents[j].address().clone(), colours.clone()),
            1.0,
        )?);
        agents[i].attach(constraint.clone())?;
        agents[j].attach(constraint.clone())?;
        constraints.push(constraint);
    }
    Ok((agents, constraints))
}

fn execution(protocol: &str, config: &DcopConfig) -> Result<Execution<Agent>, DcopError> {
    Ok(match protocol {
        "cocoa" => Execution::single(Cocoa::new(config.cocoa)),
        "dsa" => Execution::single(Dsa::new(config.dsa)),
        "mgm" => Execution::single(Mgm::new()),
        "cocoa+mgm" => Execution::chained(Cocoa::new(config.cocoa), Mgm::new()),
        "cocoa+dsa" => Execution::chained(Cocoa::new(config.cocoa), Dsa::new(config.dsa)),
        other => return Err(DcopError::Config(format!("unknown protocol '{other}'"))),
    })
}

async fn solve_local(
    registry: &Registry,
    config: &DcopConfig,
    protocol: &str,
    agents: Vec<Agent>,
    ticks: usize,
) -> Result<AssignmentMap, DcopError> {
    let runners = agents
        .into_iter()
        .map(|agent| SolverRunner::with_config(agent, execution(protocol, config)?, config.runner))
        .collect::<Result<Vec<_>, _>>()?;
    for runner in &runners {
        runner.init()?;
    }
    registry.quiesce(POLL).await;

    // CoCoA alone is single-pass; everything else iterates.
    if protocol != "cocoa" {
        for _ in 0..ticks {
            for runner in &runners {
                runner.tick()?;
            }
            registry.quiesce(POLL).await;
        }
    }

    let assignment = runners
        .iter()
        .filter_map(|runner| runner.value().map(|value| (runner.address().clone(), value)))
        .collect();
    for outcome in futures::future::join_all(runners.into_iter().map(SolverRunner::shutdown)).await {
        outcome?;
    }
    Ok(assignment)
}

async fn solve_max_sum(
    registry: &Registry,
    config: &DcopConfig,
    agents: Vec<Agent>,
    constraints: &[ConstraintRef],
    colours: &Domain,
    ticks: usize,
) -> Result<AssignmentMap, DcopError> {
    let mut function_nodes = Vec::new();
    for constraint in constraints {
        let domains = constraint
            .involved_addresses()
            .iter()
            .map(|address| (address.clone(), colours.clone()));
        function_nodes.push(FunctionNode::new(constraint.clone(), domains, registry.clone())?);
    }

    let mut variables = Vec::new();
    for agent in agents {
        let links: Vec<_> = function_nodes
            .iter()
            .filter(|f| f.neighbor_addresses().contains(agent.address()))
            .map(|f| f.address().clone())
            .collect();
        let solver = MaxSumVariable::new(config.max_sum, links);
        variables.push(SolverRunner::with_config(agent, Execution::single(solver), config.runner)?);
    }
    let functions = function_nodes
        .into_iter()
        .map(|node| {
            SolverRunner::with_config(node, Execution::single(MaxSumFunction::new(config.max_sum)), config.runner)
        })
        .collect::<Result<Vec<_>, _>>()?;

    for runner in &variables {
        runner.init()?;
    }
    for _ in 0..ticks {
        for runner in &variables {
            runner.tick()?;
        }
        for runner in &functions {
            runner.tick()?;
        }
        registry.quiesce(POLL).await;
    }

    let assignment = variables
        .iter()
        .filter_map(|runner| runner.value().map(|value| (runner.address().clone(), value)))
        .collect();
    for outcome in futures::future::join_all(variables.into_iter().map(SolverRunner::shutdown)).await {
        outcome?;
    }
    for outcome in futures::future::join_all(functions.into_iter().map(SolverRunner::shutdown)).await {
        outcome?;
    }
    Ok(assignment)
}
