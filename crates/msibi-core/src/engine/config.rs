use crate::core::compare::{DEFAULT_EXCLUSION_EPSILON, DivergenceWeighting};
use crate::core::grid::RadialGrid;
use crate::core::pair::{Pair, PairKey};
use crate::core::potential::{HeadCorrection, UpdatePolicy};
use crate::core::state::{State, StateError};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Smoothing factor {alpha} outside [0, 1]")]
    InvalidSmoothing { alpha: f64 },

    #[error("Invalid {name} = {value}: must lie inside the grid range [{r_min}, {r_max}]")]
    InvalidCutoff {
        name: &'static str,
        value: f64,
        r_min: f64,
        r_max: f64,
    },

    #[error("Invalid {name} = {value}: must be finite and positive")]
    InvalidPositive { name: &'static str, value: f64 },

    #[error("Invalid {name} = {value}: must be at least 1")]
    InvalidLimit { name: &'static str, value: usize },

    #[error(transparent)]
    State(#[from] StateError),

    #[error("No states configured")]
    NoStates,

    #[error("No pairs configured")]
    NoPairs,

    #[error("Duplicate state name '{name}'")]
    DuplicateState { name: String },

    #[error("Duplicate pair '{pair}'")]
    DuplicatePair { pair: PairKey },

    #[error("Pair '{pair}' is not constrained by any state with positive weight")]
    UnconstrainedPair { pair: PairKey },

    #[error("Target RDF for pair '{pair}' in state '{state}' is not on the run grid")]
    TargetGridMismatch { state: String, pair: PairKey },

    #[error("Seed potential for pair '{pair}' is not on the run grid")]
    PotentialGridMismatch { pair: PairKey },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceConfig {
    /// Aggregate divergence below which an iteration counts towards
    /// convergence.
    pub threshold: f64,
    /// Consecutive qualifying iterations required before the run is declared
    /// converged, guarding against false positives from measurement noise.
    pub patience: usize,
}

/// Full parameterization of an optimization run. Fixed for the life of the
/// run; validation failures here are fatal at startup and never surface
/// mid-run.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizeConfig {
    pub grid: RadialGrid,
    pub update: UpdatePolicy,
    /// RDF bins below this value are treated as unsampled and excluded from
    /// the correction.
    pub exclusion_epsilon: f64,
    pub divergence_weighting: DivergenceWeighting,
    pub convergence: ConvergenceConfig,
    pub max_iterations: usize,
    /// Wall-clock budget per state simulation; exceeding it marks the state
    /// failed for the iteration.
    pub simulation_timeout: Option<Duration>,
    /// Consecutive failures of one state that abort the run.
    pub max_state_failures: usize,
    /// Consecutive iterations a pair may go without a valid update before the
    /// run is declared stuck.
    pub max_pair_misses: usize,
    /// Where per-iteration artifacts are written; `None` disables persistence.
    pub output_dir: Option<PathBuf>,
}

impl OptimizeConfig {
    pub fn builder() -> OptimizeConfigBuilder {
        OptimizeConfigBuilder::new()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let (r_min, r_max) = (self.grid.r_min(), self.grid.r_max());
        let alpha = self.update.smoothing_alpha;
        if !(0.0..=1.0).contains(&alpha) || !alpha.is_finite() {
            return Err(ConfigError::InvalidSmoothing { alpha });
        }
        if self.update.head_cutoff < r_min || self.update.head_cutoff >= r_max {
            return Err(ConfigError::InvalidCutoff {
                name: "head_cutoff",
                value: self.update.head_cutoff,
                r_min,
                r_max,
            });
        }
        if self.update.r_switch <= r_min || self.update.r_switch >= r_max {
            return Err(ConfigError::InvalidCutoff {
                name: "r_switch",
                value: self.update.r_switch,
                r_min,
                r_max,
            });
        }
        if !self.exclusion_epsilon.is_finite() || self.exclusion_epsilon <= 0.0 {
            return Err(ConfigError::InvalidPositive {
                name: "exclusion_epsilon",
                value: self.exclusion_epsilon,
            });
        }
        if !self.convergence.threshold.is_finite() || self.convergence.threshold <= 0.0 {
            return Err(ConfigError::InvalidPositive {
                name: "convergence.threshold",
                value: self.convergence.threshold,
            });
        }
        if self.convergence.patience == 0 {
            return Err(ConfigError::InvalidLimit {
                name: "convergence.patience",
                value: 0,
            });
        }
        if self.max_iterations == 0 {
            return Err(ConfigError::InvalidLimit {
                name: "max_iterations",
                value: 0,
            });
        }
        if self.max_state_failures == 0 {
            return Err(ConfigError::InvalidLimit {
                name: "max_state_failures",
                value: 0,
            });
        }
        if self.max_pair_misses == 0 {
            return Err(ConfigError::InvalidLimit {
                name: "max_pair_misses",
                value: 0,
            });
        }
        Ok(())
    }

    /// Cross-checks the run setup: unique names, every table and target on
    /// the run grid, and normalizable weights for every pair.
    pub fn validate_setup(&self, states: &[State], pairs: &[Pair]) -> Result<(), ConfigError> {
        self.validate()?;
        if states.is_empty() {
            return Err(ConfigError::NoStates);
        }
        if pairs.is_empty() {
            return Err(ConfigError::NoPairs);
        }

        let mut state_names = HashSet::new();
        for state in states {
            if !state_names.insert(state.name().to_string()) {
                return Err(ConfigError::DuplicateState {
                    name: state.name().to_string(),
                });
            }
            for (pair, target) in state.targets() {
                if !target.grid().matches(&self.grid) {
                    return Err(ConfigError::TargetGridMismatch {
                        state: state.name().to_string(),
                        pair: pair.clone(),
                    });
                }
            }
        }

        let mut pair_keys = HashSet::new();
        for pair in pairs {
            if !pair_keys.insert(pair.key().clone()) {
                return Err(ConfigError::DuplicatePair {
                    pair: pair.key().clone(),
                });
            }
            if !pair.potential().grid().matches(&self.grid) {
                return Err(ConfigError::PotentialGridMismatch {
                    pair: pair.key().clone(),
                });
            }
            let constrained = states
                .iter()
                .any(|s| s.weight() > 0.0 && s.target(pair.key()).is_some());
            if !constrained {
                return Err(ConfigError::UnconstrainedPair {
                    pair: pair.key().clone(),
                });
            }
        }
        Ok(())
    }
}

pub struct OptimizeConfigBuilder {
    grid: Option<RadialGrid>,
    head_cutoff: Option<f64>,
    head_correction: HeadCorrection,
    r_switch: Option<f64>,
    smoothing_alpha: f64,
    max_potential: Option<f64>,
    exclusion_epsilon: f64,
    divergence_weighting: DivergenceWeighting,
    convergence_threshold: f64,
    convergence_patience: usize,
    max_iterations: usize,
    simulation_timeout: Option<Duration>,
    max_state_failures: usize,
    max_pair_misses: usize,
    output_dir: Option<PathBuf>,
}

impl Default for OptimizeConfigBuilder {
    fn default() -> Self {
        Self {
            grid: None,
            head_cutoff: None,
            head_correction: HeadCorrection::Linear,
            r_switch: None,
            smoothing_alpha: 0.0,
            max_potential: None,
            exclusion_epsilon: DEFAULT_EXCLUSION_EPSILON,
            divergence_weighting: DivergenceWeighting::Uniform,
            convergence_threshold: 1e-4,
            convergence_patience: 3,
            max_iterations: 10,
            simulation_timeout: None,
            max_state_failures: 3,
            max_pair_misses: 3,
            output_dir: None,
        }
    }
}

impl OptimizeConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grid(mut self, grid: RadialGrid) -> Self {
        self.grid = Some(grid);
        self
    }
    pub fn head_cutoff(mut self, r: f64) -> Self {
        self.head_cutoff = Some(r);
        self
    }
    pub fn head_correction(mut self, form: HeadCorrection) -> Self {
        self.head_correction = form;
        self
    }
    pub fn r_switch(mut self, r: f64) -> Self {
        self.r_switch = Some(r);
        self
    }
    pub fn smoothing_alpha(mut self, alpha: f64) -> Self {
        self.smoothing_alpha = alpha;
        self
    }
    pub fn max_potential(mut self, max: f64) -> Self {
        self.max_potential = Some(max);
        self
    }
    pub fn exclusion_epsilon(mut self, epsilon: f64) -> Self {
        self.exclusion_epsilon = epsilon;
        self
    }
    pub fn divergence_weighting(mut self, weighting: DivergenceWeighting) -> Self {
        self.divergence_weighting = weighting;
        self
    }
    pub fn convergence_threshold(mut self, threshold: f64) -> Self {
        self.convergence_threshold = threshold;
        self
    }
    pub fn convergence_patience(mut self, patience: usize) -> Self {
        self.convergence_patience = patience;
        self
    }
    pub fn max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = iterations;
        self
    }
    pub fn simulation_timeout(mut self, timeout: Duration) -> Self {
        self.simulation_timeout = Some(timeout);
        self
    }
    pub fn max_state_failures(mut self, limit: usize) -> Self {
        self.max_state_failures = limit;
        self
    }
    pub fn max_pair_misses(mut self, limit: usize) -> Self {
        self.max_pair_misses = limit;
        self
    }
    pub fn output_dir(mut self, dir: PathBuf) -> Self {
        self.output_dir = Some(dir);
        self
    }

    pub fn build(self) -> Result<OptimizeConfig, ConfigError> {
        let grid = self.grid.ok_or(ConfigError::MissingParameter("grid"))?;
        // Defaults carried over from the original tool: the tail switch sits
        // five spacings inside the outer edge, the head correction is off
        // until a cutoff is supplied.
        let r_switch = self
            .r_switch
            .unwrap_or_else(|| grid.r_max() - 5.0 * grid.dr());
        let head_cutoff = self.head_cutoff.unwrap_or_else(|| grid.r_min());

        let config = OptimizeConfig {
            grid,
            update: UpdatePolicy {
                head_cutoff,
                head_correction: self.head_correction,
                r_switch,
                smoothing_alpha: self.smoothing_alpha,
                max_potential: self.max_potential,
            },
            exclusion_epsilon: self.exclusion_epsilon,
            divergence_weighting: self.divergence_weighting,
            convergence: ConvergenceConfig {
                threshold: self.convergence_threshold,
                patience: self.convergence_patience,
            },
            max_iterations: self.max_iterations,
            simulation_timeout: self.simulation_timeout,
            max_state_failures: self.max_state_failures,
            max_pair_misses: self.max_pair_misses,
            output_dir: self.output_dir,
        };
        config.validate()?;
        Ok(config)
    }
}
