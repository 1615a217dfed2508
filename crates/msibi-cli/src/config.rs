//! Serde models for the TOML run file and their resolution into the core
//! library's setup types. Relative paths inside the run file are resolved
//! against the file's own directory, so a run directory can be moved as a
//! unit.

use crate::error::{CliError, Result};
use msibi::core::grid::RadialGrid;
use msibi::core::pair::{Pair, PairKey};
use msibi::core::potential::{HeadCorrection, PotentialTable};
use msibi::core::rdf::Rdf;
use msibi::core::state::State;
use msibi::core::compare::DivergenceWeighting;
use msibi::engine::backend::{CommandBackend, StateRunSpec};
use msibi::engine::config::OptimizeConfig;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RunFile {
    pub grid: GridSection,
    #[serde(default)]
    pub update: UpdateSection,
    #[serde(default)]
    pub convergence: ConvergenceSection,
    #[serde(default)]
    pub run: RunSection,
    pub states: Vec<StateSection>,
    pub pairs: Vec<PairSection>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct GridSection {
    #[serde(default)]
    pub r_min: f64,
    pub r_max: f64,
    /// Bin spacing; mutually exclusive with `n-points`.
    pub dr: Option<f64>,
    /// Number of grid points from zero to `r-max`, the original tool's
    /// parameterization; mutually exclusive with `dr`.
    pub n_points: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct UpdateSection {
    pub head_cutoff: Option<f64>,
    pub head_correction: Option<HeadCorrection>,
    pub r_switch: Option<f64>,
    pub smoothing_alpha: Option<f64>,
    pub max_potential: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct ConvergenceSection {
    pub threshold: Option<f64>,
    pub patience: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct RunSection {
    pub max_iterations: Option<usize>,
    /// Per-state wall-clock budget, in seconds.
    pub simulation_timeout: Option<f64>,
    pub max_state_failures: Option<usize>,
    pub max_pair_misses: Option<usize>,
    pub output_dir: Option<PathBuf>,
    pub divergence_weighting: Option<DivergenceWeighting>,
    pub exclusion_epsilon: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct StateSection {
    pub name: String,
    pub kt: f64,
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Working directory handed to the simulation command.
    pub dir: PathBuf,
    /// Program and arguments launching the query simulation.
    pub command: Vec<String>,
    pub seed: Option<u64>,
    pub targets: Vec<TargetSection>,
}

fn default_weight() -> f64 {
    1.0
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct TargetSection {
    pub type_a: String,
    pub type_b: String,
    /// Target RDF table; resampled onto the run grid when loaded.
    pub path: PathBuf,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct PairSection {
    pub type_a: String,
    pub type_b: String,
    /// Seed potential table. When absent, the seed is the Boltzmann inversion
    /// of the pair's target RDF from the highest-weight state targeting it.
    pub potential: Option<PathBuf>,
}

/// CLI-side overrides applied on top of the run file; the command line always
/// wins.
#[derive(Debug, Default)]
pub struct Overrides {
    pub output_dir: Option<PathBuf>,
    pub max_iterations: Option<usize>,
    pub threshold: Option<f64>,
    pub timeout: Option<f64>,
}

/// A fully resolved run: everything the optimization workflow needs.
pub struct RunSetup {
    pub config: OptimizeConfig,
    pub states: Vec<State>,
    pub pairs: Vec<Pair>,
    pub backend: CommandBackend,
}

impl RunFile {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })?;
        toml::from_str(&raw).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e.into(),
        })
    }

    /// Resolves the parsed file into core types. `base_dir` is the directory
    /// the run file lives in; every relative path is interpreted against it.
    pub fn resolve(&self, base_dir: &Path, overrides: &Overrides) -> Result<RunSetup> {
        let grid = self.build_grid()?;
        let config = self.build_config(grid, base_dir, overrides)?;
        let states = self.build_states(&grid, base_dir)?;
        let pairs = self.build_pairs(&grid, &states, config.exclusion_epsilon, base_dir)?;
        let backend = self.build_backend(base_dir);

        info!(
            states = states.len(),
            pairs = pairs.len(),
            grid_points = grid.len(),
            "Run file resolved."
        );
        Ok(RunSetup {
            config,
            states,
            pairs,
            backend,
        })
    }

    fn build_grid(&self) -> Result<RadialGrid> {
        let section = &self.grid;
        match (section.dr, section.n_points) {
            (Some(dr), None) => RadialGrid::new(section.r_min, section.r_max, dr)
                .map_err(|e| CliError::Config(e.to_string())),
            (None, Some(n_points)) => {
                if section.r_min != 0.0 {
                    return Err(CliError::Config(
                        "grid.n-points implies r-min = 0; use grid.dr for a shifted grid"
                            .to_string(),
                    ));
                }
                RadialGrid::from_cutoff(section.r_max, n_points)
                    .map_err(|e| CliError::Config(e.to_string()))
            }
            (Some(_), Some(_)) => Err(CliError::Config(
                "grid.dr and grid.n-points are mutually exclusive".to_string(),
            )),
            (None, None) => Err(CliError::Config(
                "the grid needs either dr or n-points".to_string(),
            )),
        }
    }

    fn build_config(
        &self,
        grid: RadialGrid,
        base_dir: &Path,
        overrides: &Overrides,
    ) -> Result<OptimizeConfig> {
        let mut builder = OptimizeConfig::builder().grid(grid);

        if let Some(r) = self.update.head_cutoff {
            builder = builder.head_cutoff(r);
        }
        if let Some(form) = self.update.head_correction {
            builder = builder.head_correction(form);
        }
        if let Some(r) = self.update.r_switch {
            builder = builder.r_switch(r);
        }
        if let Some(alpha) = self.update.smoothing_alpha {
            builder = builder.smoothing_alpha(alpha);
        }
        if let Some(max) = self.update.max_potential {
            builder = builder.max_potential(max);
        }

        if let Some(threshold) = overrides.threshold.or(self.convergence.threshold) {
            builder = builder.convergence_threshold(threshold);
        }
        if let Some(patience) = self.convergence.patience {
            builder = builder.convergence_patience(patience);
        }

        if let Some(iterations) = overrides.max_iterations.or(self.run.max_iterations) {
            builder = builder.max_iterations(iterations);
        }
        if let Some(seconds) = overrides.timeout.or(self.run.simulation_timeout) {
            if !seconds.is_finite() || seconds <= 0.0 {
                return Err(CliError::Config(format!(
                    "simulation-timeout must be positive, got {seconds}"
                )));
            }
            builder = builder.simulation_timeout(Duration::from_secs_f64(seconds));
        }
        if let Some(limit) = self.run.max_state_failures {
            builder = builder.max_state_failures(limit);
        }
        if let Some(limit) = self.run.max_pair_misses {
            builder = builder.max_pair_misses(limit);
        }
        if let Some(weighting) = self.run.divergence_weighting {
            builder = builder.divergence_weighting(weighting);
        }
        if let Some(epsilon) = self.run.exclusion_epsilon {
            builder = builder.exclusion_epsilon(epsilon);
        }
        // The CLI flag is taken verbatim; a path from the run file follows
        // the run directory.
        if let Some(dir) = &overrides.output_dir {
            builder = builder.output_dir(dir.clone());
        } else if let Some(dir) = &self.run.output_dir {
            builder = builder.output_dir(resolve_path(base_dir, dir));
        }

        builder
            .build()
            .map_err(|e| CliError::Core(e.into()))
            .map(|config| {
                debug!(?config, "Resolved optimization configuration.");
                config
            })
    }

    fn build_states(&self, grid: &RadialGrid, base_dir: &Path) -> Result<Vec<State>> {
        let mut states = Vec::with_capacity(self.states.len());
        for section in &self.states {
            let mut state = State::new(&section.name, section.kt, section.weight)
                .map_err(|e| CliError::Config(e.to_string()))?;
            let state_dir = resolve_path(base_dir, &section.dir);
            for target in &section.targets {
                let path = resolve_path(&state_dir, &target.path);
                let raw = Rdf::from_csv_path(&path).map_err(|source| CliError::Table {
                    path: path.clone(),
                    source,
                })?;
                let resampled = raw
                    .resample_onto(grid)
                    .map_err(|e| CliError::Config(e.to_string()))?;
                state.add_target(PairKey::new(&target.type_a, &target.type_b), resampled);
            }
            states.push(state);
        }
        Ok(states)
    }

    fn build_pairs(
        &self,
        grid: &RadialGrid,
        states: &[State],
        epsilon: f64,
        base_dir: &Path,
    ) -> Result<Vec<Pair>> {
        let mut pairs = Vec::with_capacity(self.pairs.len());
        for section in &self.pairs {
            let key = PairKey::new(&section.type_a, &section.type_b);
            let potential = match &section.potential {
                Some(path) => {
                    let path = resolve_path(base_dir, path);
                    PotentialTable::from_csv_path(&path).map_err(|source| CliError::Table {
                        path: path.clone(),
                        source,
                    })?
                }
                None => seed_from_target(&key, states, epsilon)?,
            };
            if !potential.grid().matches(grid) {
                return Err(CliError::Config(format!(
                    "seed potential for pair '{key}' is not on the run grid"
                )));
            }
            pairs.push(Pair::new(key, potential));
        }
        Ok(pairs)
    }

    fn build_backend(&self, base_dir: &Path) -> CommandBackend {
        let mut specs = HashMap::new();
        for section in &self.states {
            specs.insert(
                section.name.clone(),
                StateRunSpec {
                    working_dir: resolve_path(base_dir, &section.dir),
                    command: section.command.clone(),
                    seed: section.seed,
                },
            );
        }
        CommandBackend::new(specs)
    }
}

/// Boltzmann-inverts the target RDF of the highest-weight state constraining
/// the pair, the original tool's default seed.
fn seed_from_target(key: &PairKey, states: &[State], epsilon: f64) -> Result<PotentialTable> {
    let state = states
        .iter()
        .filter(|s| s.target(key).is_some())
        .max_by(|a, b| a.weight().total_cmp(&b.weight()))
        .ok_or_else(|| {
            CliError::Config(format!(
                "pair '{key}' has no seed potential and no state targets it"
            ))
        })?;
    info!(
        pair = %key,
        state = state.name(),
        "Seeding potential by Boltzmann inversion of the target RDF."
    );
    let target = state
        .target(key)
        .ok_or_else(|| CliError::Config(format!("no target for pair '{key}'")))?;
    target
        .boltzmann_inversion(state.kt(), epsilon)
        .map_err(|e| CliError::Config(e.to_string()))
}

fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
