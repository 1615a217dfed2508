use crate::core::grid::RadialGrid;
use crate::core::pair::{Pair, PairKey};
use crate::core::potential::{UpdatePolicy, UpdateStats};
use crate::core::state::State;
use crate::engine::config::OptimizeConfig;
use crate::engine::error::EngineError;
use serde::Serialize;
use std::fmt;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// One successful (state, pair) measurement within an iteration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementRecord {
    pub state: String,
    pub pair: PairKey,
    pub divergence: f64,
    pub fit_quality: f64,
}

/// A state whose simulation failed or timed out this iteration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailureRecord {
    pub state: String,
    pub reason: String,
}

/// What happened to one pair's potential in an iteration.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PairOutcome {
    /// The aggregated correction was applied.
    Updated { pair: PairKey, stats: UpdateStats },
    /// No state contributed a valid measurement; the table was left as-is.
    Skipped { pair: PairKey },
    /// The aggregated correction was non-finite and rejected.
    Rejected { pair: PairKey, reason: String },
}

impl PairOutcome {
    pub fn pair(&self) -> &PairKey {
        match self {
            PairOutcome::Updated { pair, .. }
            | PairOutcome::Skipped { pair }
            | PairOutcome::Rejected { pair, .. } => pair,
        }
    }
}

/// Per-iteration snapshot appended to the run history after every completed
/// iteration, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IterationRecord {
    pub index: usize,
    pub measurements: Vec<MeasurementRecord>,
    pub failures: Vec<FailureRecord>,
    pub pair_outcomes: Vec<PairOutcome>,
    /// Weighted mean divergence over the successful measurements; `None` when
    /// every state failed.
    pub aggregate_divergence: Option<f64>,
}

/// Append-only log of iteration records, available for diagnosis regardless
/// of how the run ends.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunHistory {
    records: Vec<IterationRecord>,
}

impl RunHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: IterationRecord) {
        self.records.push(record);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[inline]
    pub fn records(&self) -> &[IterationRecord] {
        &self.records
    }

    #[inline]
    pub fn last(&self) -> Option<&IterationRecord> {
        self.records.last()
    }
}

/// Terminal condition of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum RunOutcome {
    Converged { iterations: usize },
    MaxIterationsReached { iterations: usize },
    Failed { iterations: usize, reason: String },
}

impl fmt::Display for RunOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOutcome::Converged { iterations } => {
                write!(f, "converged after {iterations} iteration(s)")
            }
            RunOutcome::MaxIterationsReached { iterations } => {
                write!(f, "reached the iteration cap of {iterations}")
            }
            RunOutcome::Failed { iterations, reason } => {
                write!(f, "failed after {iterations} iteration(s): {reason}")
            }
        }
    }
}

/// Run-level metadata persisted once at startup; the grid and cutoffs are
/// fixed for the life of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunMetadata {
    pub grid: RadialGrid,
    pub update: UpdatePolicy,
    pub exclusion_epsilon: f64,
    pub convergence_threshold: f64,
    pub convergence_patience: usize,
    pub max_iterations: usize,
    pub simulation_timeout_seconds: Option<f64>,
    pub states: Vec<StateMetadata>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StateMetadata {
    pub name: String,
    pub kt: f64,
    pub weight: f64,
}

impl RunMetadata {
    pub fn from_setup(config: &OptimizeConfig, states: &[State]) -> Self {
        Self {
            grid: config.grid,
            update: config.update.clone(),
            exclusion_epsilon: config.exclusion_epsilon,
            convergence_threshold: config.convergence.threshold,
            convergence_patience: config.convergence.patience,
            max_iterations: config.max_iterations,
            simulation_timeout_seconds: config.simulation_timeout.map(|d| d.as_secs_f64()),
            states: states
                .iter()
                .map(|s| StateMetadata {
                    name: s.name().to_string(),
                    kt: s.kt(),
                    weight: s.weight(),
                })
                .collect(),
        }
    }
}

/// Writes the persisted run layout: per-iteration potential tables, measured
/// RDFs, a fit-quality log, and the run metadata.
pub struct ArtifactWriter {
    root: PathBuf,
    potentials_dir: PathBuf,
    rdfs_dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(root: &Path) -> std::io::Result<Self> {
        let potentials_dir = root.join("potentials");
        let rdfs_dir = root.join("rdfs");
        std::fs::create_dir_all(&potentials_dir)?;
        std::fs::create_dir_all(&rdfs_dir)?;
        Ok(Self {
            root: root.to_path_buf(),
            potentials_dir,
            rdfs_dir,
        })
    }

    pub fn write_metadata(&self, metadata: &RunMetadata) -> Result<(), EngineError> {
        let rendered = toml::to_string_pretty(metadata)
            .map_err(|e| EngineError::Internal(format!("failed to render run metadata: {e}")))?;
        std::fs::write(self.root.join("run.toml"), rendered)?;
        Ok(())
    }

    /// Persists one completed iteration: an evolution snapshot and the live
    /// table per pair, the measured RDF per (state, pair), and one fit line
    /// per measurement.
    pub fn write_iteration(
        &self,
        record: &IterationRecord,
        pairs: &[Pair],
        states: &[State],
    ) -> Result<(), EngineError> {
        for pair in pairs {
            let snapshot = self
                .potentials_dir
                .join(format!("step{}.pot.{}.csv", record.index, pair.key()));
            pair.potential().write_csv_path(&snapshot)?;
            // The live copy, overwritten every iteration, is what the next
            // round of simulations reads.
            let live = self.root.join(format!("pot.{}.csv", pair.key()));
            pair.potential().write_csv_path(&live)?;
        }

        for state in states {
            for pair in state.targets().keys() {
                if let Some(measured) = state.measurement(pair) {
                    let path = self.rdfs_dir.join(format!(
                        "pair_{}-state_{}-step{}.csv",
                        pair,
                        state.name(),
                        record.index
                    ));
                    measured.write_csv_path(&path)?;
                }
            }
        }

        let mut log = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.root.join("f_fits.log"))?;
        for m in &record.measurements {
            writeln!(
                log,
                "pair {}, state {}, iteration {}: {:.6}",
                m.pair, m.state, record.index, m.fit_quality
            )?;
            info!(
                pair = %m.pair,
                state = %m.state,
                iteration = record.index,
                fit = m.fit_quality,
                divergence = m.divergence,
                "Recorded measurement."
            );
        }
        Ok(())
    }
}
