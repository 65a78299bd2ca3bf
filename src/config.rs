//! Run configuration: the recognised options, TOML loading, and validation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::graph::Objective;
use crate::SimError;

/// The full set of options a run recognises. Loadable from a TOML file via
/// [`SimConfig::load`] and overridable field-by-field by the CLI front-end.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimConfig {
    /// λ of the pair Poisson arrival process.
    pub pair_arrival_rate: f64,
    /// μ of pair sojourn; `0` means pairs never depart on their own.
    pub pair_departure_rate: f64,
    /// λ of the altruist Poisson arrival process; `0` means no altruists.
    #[serde(default)]
    pub altruist_arrival_rate: f64,
    /// μ of altruist sojourn; `0` means altruists never depart on their own.
    #[serde(default)]
    pub altruist_departure_rate: f64,
    /// Which weight formula the matching engine scores cycles/chains with.
    #[serde(default = "default_objective")]
    pub problem_type: Objective,
    /// Matching trigger threshold; `1` is greedy-per-arrival.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Simulated-time horizon the arrival streams are generated up to.
    pub time_limit: f64,
    /// PRNG seed; a run is bit-for-bit reproducible given the same seed and
    /// the same remaining fields.
    #[serde(default)]
    pub seed: u64,
    /// Maximum chain length `L`.
    #[serde(default = "default_max_chain_length")]
    pub max_chain_length: usize,
    /// Path to the NKR pool-composition file (`distributions.txt`).
    pub distributions_path: PathBuf,
    /// Optional wall-clock cap (milliseconds) passed through to the solver.
    #[serde(default)]
    pub solver_time_cap_ms: Option<u64>,
}

fn default_objective() -> Objective {
    Objective::Simple
}

fn default_batch_size() -> usize {
    1
}

fn default_max_chain_length() -> usize {
    10
}

impl SimConfig {
    /// Load and parse a TOML configuration file. Does not validate —
    /// callers should call [`SimConfig::validate`] before scheduling any
    /// event, per the "ConfigError is raised before any event is scheduled"
    /// propagation policy.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SimError> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            SimError::ConfigError(format!("cannot read {}: {e}", path.as_ref().display()))
        })?;
        toml::from_str(&text)
            .map_err(|e| SimError::ConfigError(format!("cannot parse config: {e}")))
    }

    /// Check every invariant the recognised options table promises.
    pub fn validate(&self) -> Result<(), SimError> {
        let rates = [
            ("pair_arrival_rate", self.pair_arrival_rate),
            ("pair_departure_rate", self.pair_departure_rate),
            ("altruist_arrival_rate", self.altruist_arrival_rate),
            ("altruist_departure_rate", self.altruist_departure_rate),
        ];
        for (name, rate) in rates {
            if rate < 0.0 {
                return Err(SimError::ConfigError(format!("{name} must be >= 0 (got {rate})")));
            }
        }
        if self.time_limit <= 0.0 {
            return Err(SimError::ConfigError(format!(
                "time_limit must be positive (got {})",
                self.time_limit
            )));
        }
        if self.batch_size < 1 {
            return Err(SimError::ConfigError("batch_size must be >= 1".into()));
        }
        if self.max_chain_length < 1 {
            return Err(SimError::ConfigError("max_chain_length must be >= 1".into()));
        }
        Ok(())
    }
}
