use crate::core::grid::RadialGrid;
use crate::core::io::TableIoError;
use crate::core::pair::PairKey;
use crate::core::potential::PotentialTable;
use crate::core::rdf::Rdf;
use crate::core::state::State;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};

/// Poll interval while waiting on an external simulation process.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Simulation command exited with {status}")]
    CommandFailed { status: std::process::ExitStatus },

    #[error("Simulation timed out after {seconds:.1} s")]
    TimedOut { seconds: f64 },

    #[error("Expected RDF output missing: '{path}'", path = path.display())]
    MissingRdf { path: PathBuf },

    #[error("Backend I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Table(#[from] TableIoError),

    #[error("{0}")]
    Other(String),
}

/// Immutable per-iteration view of every pair's potential, the only thing a
/// simulation task ever sees. Backends must not mutate the tables they are
/// handed; the optimizer owns the live copies.
pub type PotentialSnapshot = HashMap<PairKey, PotentialTable>;

/// The external molecular-dynamics engine realizing one thermodynamic state.
///
/// Implementations are expected to be deterministic under a fixed random seed
/// (a configuration concern of the backend, not of the optimizer).
pub trait SimulationBackend: Sync {
    /// Opaque handle to the produced trajectory, consumed by the paired
    /// [`RdfExtractor`].
    type Trajectory;

    fn run(
        &self,
        state: &State,
        potentials: &PotentialSnapshot,
        timeout: Option<Duration>,
    ) -> Result<Self::Trajectory, BackendError>;
}

/// The external statistical-mechanics collaborator that turns a trajectory
/// into a measured RDF on the requested grid.
pub trait RdfExtractor<T>: Sync {
    fn compute_rdf(
        &self,
        trajectory: &T,
        pair: &PairKey,
        grid: &RadialGrid,
    ) -> Result<Rdf, BackendError>;
}

/// How to launch the query simulation for one state.
#[derive(Debug, Clone)]
pub struct StateRunSpec {
    pub working_dir: PathBuf,
    /// Program and arguments, executed with the working directory as cwd.
    pub command: Vec<String>,
    /// Seed forwarded to the command for reproducible runs.
    pub seed: Option<u64>,
}

/// Subprocess-driven backend: writes the current tables into each state's
/// working directory, launches the configured command, and reads back the
/// per-pair RDF files the command produces.
///
/// Contract with the command: it finds one `pot.{pair}.csv` table per pair in
/// its working directory, runs the simulation, and leaves one
/// `rdf.{pair}.csv` file per pair behind. The state name, kT, and seed are
/// exported as `MSIBI_STATE`, `MSIBI_KT`, and `MSIBI_SEED`.
pub struct CommandBackend {
    specs: HashMap<String, StateRunSpec>,
}

/// Trajectory handle for [`CommandBackend`]: the directory holding the
/// command's outputs.
#[derive(Debug, Clone)]
pub struct CommandTrajectory {
    working_dir: PathBuf,
}

impl CommandBackend {
    pub fn new(specs: HashMap<String, StateRunSpec>) -> Self {
        Self { specs }
    }

    fn spec_for(&self, state: &State) -> Result<&StateRunSpec, BackendError> {
        self.specs.get(state.name()).ok_or_else(|| {
            BackendError::Other(format!("no run spec configured for state '{}'", state.name()))
        })
    }
}

impl SimulationBackend for CommandBackend {
    type Trajectory = CommandTrajectory;

    fn run(
        &self,
        state: &State,
        potentials: &PotentialSnapshot,
        timeout: Option<Duration>,
    ) -> Result<CommandTrajectory, BackendError> {
        let spec = self.spec_for(state)?;
        std::fs::create_dir_all(&spec.working_dir)?;

        for (key, table) in potentials {
            let path = spec.working_dir.join(format!("pot.{key}.csv"));
            table.write_csv_path(&path)?;
        }

        let (program, args) = spec
            .command
            .split_first()
            .ok_or_else(|| BackendError::Other(format!("empty command for state '{}'", state.name())))?;

        let mut command = Command::new(program);
        command
            .args(args)
            .current_dir(&spec.working_dir)
            .env("MSIBI_STATE", state.name())
            .env("MSIBI_KT", state.kt().to_string())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(seed) = spec.seed {
            command.env("MSIBI_SEED", seed.to_string());
        }

        info!(state = state.name(), program, "Launching query simulation.");
        let mut child = command.spawn()?;

        let status = match timeout {
            None => child.wait()?,
            Some(limit) => {
                let deadline = Instant::now() + limit;
                loop {
                    if let Some(status) = child.try_wait()? {
                        break status;
                    }
                    if Instant::now() >= deadline {
                        // Best effort; the state is failed either way.
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(BackendError::TimedOut {
                            seconds: limit.as_secs_f64(),
                        });
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
            }
        };

        if !status.success() {
            return Err(BackendError::CommandFailed { status });
        }
        debug!(state = state.name(), "Query simulation finished.");
        Ok(CommandTrajectory {
            working_dir: spec.working_dir.clone(),
        })
    }
}

impl RdfExtractor<CommandTrajectory> for CommandBackend {
    fn compute_rdf(
        &self,
        trajectory: &CommandTrajectory,
        pair: &PairKey,
        grid: &RadialGrid,
    ) -> Result<Rdf, BackendError> {
        let path = trajectory.working_dir.join(format!("rdf.{pair}.csv"));
        if !path.exists() {
            return Err(BackendError::MissingRdf { path });
        }
        let measured = Rdf::from_csv_path(&path)?;
        Ok(measured.resample_onto(grid).map_err(TableIoError::from)?)
    }
}
