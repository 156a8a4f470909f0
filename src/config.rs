//! Experiment configuration.
//!
//! Typed replacements for the free-form property bag agents used to carry:
//! only settings a protocol actually consumes exist here. Every struct has
//! serde defaults, so a YAML or JSON document only needs the keys it changes.
//!
//! # Example YAML
//!
//! ```yaml
//! runner:
//!   shutdown_timeout_ms: 500
//! cocoa:
//!   initial_uniqueness_bound: 1
//! dsa:
//!   probability: 0.7
//!   variant: c
//! max_sum:
//!   normalization: mean
//!   alternating_direction:
//!     switch_every: 3
//!   value_propagation:
//!     after_switches: 4
//! ```

use std::path::Path;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::assignment::Normalization;
use crate::error::DcopError;

// ============================================================================
// Per-agent profile
// ============================================================================

/// Per-agent settings consumed by the protocols.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    /// Whether this agent starts CoCoA by activating itself.
    #[serde(default)]
    pub is_root: bool,
    /// Seed for the agent's random choices; entropy when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl AgentProfile {
    /// Profile of the designated CoCoA root.
    pub fn root() -> Self {
        Self {
            is_root: true,
            seed: None,
        }
    }

    /// Same profile with a fixed seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Fresh random generator following the seed policy.
    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

// ============================================================================
// Runner
// ============================================================================

/// Settings for [`SolverRunner`](crate::runner::SolverRunner).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunnerConfig {
    /// Bounded wait when joining a runner's task during reset.
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

fn default_shutdown_timeout_ms() -> u64 { 1000 }

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

impl RunnerConfig {
    /// Join timeout as a `Duration`.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

// ============================================================================
// Protocols
// ============================================================================

/// CoCoA settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CocoaConfig {
    /// Number of tied minimizers tolerated before holding back.
    #[serde(default = "default_uniqueness_bound")]
    pub initial_uniqueness_bound: usize,
}

fn default_uniqueness_bound() -> usize { 1 }

impl Default for CocoaConfig {
    fn default() -> Self {
        Self {
            initial_uniqueness_bound: default_uniqueness_bound(),
        }
    }
}

/// When a DSA agent may move to a new best response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DsaVariant {
    /// Only on strict improvement.
    A,
    /// On strict improvement, or on a tie while the current cost is non-zero.
    #[default]
    B,
    /// On strict improvement or any tie.
    C,
}

/// DSA settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DsaConfig {
    /// Probability of acting on a tick.
    #[serde(default = "default_probability")]
    pub probability: f64,
    /// Move rule.
    #[serde(default)]
    pub variant: DsaVariant,
}

fn default_probability() -> f64 { 0.5 }

impl Default for DsaConfig {
    fn default() -> Self {
        Self {
            probability: default_probability(),
            variant: DsaVariant::default(),
        }
    }
}

/// Alternating-direction schedule for Max-Sum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlternatingDirection {
    /// Ticks between direction switches.
    #[serde(default = "default_switch_every")]
    pub switch_every: u64,
}

fn default_switch_every() -> u64 { 2 }

impl Default for AlternatingDirection {
    fn default() -> Self {
        Self {
            switch_every: default_switch_every(),
        }
    }
}

/// Value propagation for Max-Sum function nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValuePropagation {
    /// Direction switches required before known values replace minimization.
    #[serde(default = "default_after_switches")]
    pub after_switches: u64,
}

fn default_after_switches() -> u64 { 2 }

impl Default for ValuePropagation {
    fn default() -> Self {
        Self {
            after_switches: default_after_switches(),
        }
    }
}

/// Max-Sum settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaxSumConfig {
    /// Normalizing constant for variable-to-function messages.
    #[serde(default)]
    pub normalization: Normalization,
    /// Alternating-direction scheduling; every edge is used every tick when absent.
    #[serde(default)]
    pub alternating_direction: Option<AlternatingDirection>,
    /// Value propagation; requires alternating direction.
    #[serde(default)]
    pub value_propagation: Option<ValuePropagation>,
}

// ============================================================================
// Aggregate
// ============================================================================

/// Complete experiment configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DcopConfig {
    #[serde(default)]
    pub runner: RunnerConfig,
    #[serde(default)]
    pub cocoa: CocoaConfig,
    #[serde(default)]
    pub dsa: DsaConfig,
    #[serde(default)]
    pub max_sum: MaxSumConfig,
}

impl DcopConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, DcopError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, DcopError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, DcopError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    /// Reject settings no protocol can run with.
    pub fn validate(&self) -> Result<(), DcopError> {
        if !(0.0..=1.0).contains(&self.dsa.probability) {
            return Err(DcopError::Config(format!(
                "dsa.probability must be within [0, 1], got {}",
                self.dsa.probability
            )));
        }
        if self.cocoa.initial_uniqueness_bound == 0 {
            return Err(DcopError::Config(
                "cocoa.initial_uniqueness_bound must be at least 1".to_string(),
            ));
        }
        if let Some(ad) = self.max_sum.alternating_direction {
            if ad.switch_every == 0 {
                return Err(DcopError::Config(
                    "max_sum.alternating_direction.switch_every must be at least 1".to_string(),
                ));
            }
        }
        if self.max_sum.value_propagation.is_some() && self.max_sum.alternating_direction.is_none() {
            return Err(DcopError::Config(
                "max_sum.value_propagation requires alternating_direction".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = DcopConfig::default();
        assert_eq!(config.runner.shutdown_timeout(), Duration::from_secs(1));
        assert_eq!(config.cocoa.initial_uniqueness_bound, 1);
        assert_eq!(config.dsa.variant, DsaVariant::B);
        assert_eq!(config.max_sum.normalization, Normalization::Min);
        assert!(config.max_sum.alternating_direction.is_none());
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config = DcopConfig::from_yaml_str(
            "dsa:\n  variant: c\nmax_sum:\n  normalization: mean\n  alternating_direction: {}\n",
        )
        .unwrap();
        assert_eq!(config.dsa.variant, DsaVariant::C);
        assert_eq!(config.dsa.probability, 0.5);
        assert_eq!(config.max_sum.normalization, Normalization::Mean);
        assert_eq!(config.max_sum.alternating_direction.unwrap().switch_every, 2);
    }

    #[test]
    fn test_json_loading() {
        let config = DcopConfig::from_json_str(r#"{"runner": {"shutdown_timeout_ms": 25}}"#).unwrap();
        assert_eq!(config.runner.shutdown_timeout(), Duration::from_millis(25));
    }

    #[test]
    fn test_validation_failures() {
        assert!(matches!(
            DcopConfig::from_yaml_str("dsa:\n  probability: 1.5\n"),
            Err(DcopError::Config(_))
        ));
        assert!(matches!(
            DcopConfig::from_yaml_str("cocoa:\n  initial_uniqueness_bound: 0\n"),
            Err(DcopError::Config(_))
        ));
        assert!(matches!(
            DcopConfig::from_yaml_str("max_sum:\n  value_propagation: {}\n"),
            Err(DcopError::Config(_))
        ));
        assert!(matches!(
            DcopConfig::from_yaml_str("max_sum: [1, 2]"),
            Err(DcopError::Yaml(_))
        ));
    }

    #[test]
    fn test_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "cocoa:\n  initial_uniqueness_bound: 3").unwrap();
        let config = DcopConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.cocoa.initial_uniqueness_bound, 3);
        assert!(matches!(
            DcopConfig::from_yaml_file("/nonexistent/dcop.yaml"),
            Err(DcopError::Io(_))
        ));
    }

    #[test]
    fn test_seeded_profiles_repeat() {
        let profile = AgentProfile::root().with_seed(42);
        let a: u64 = profile.rng().gen();
        let b: u64 = profile.rng().gen();
        assert_eq!(a, b);
        assert!(profile.is_root);
    }
}
