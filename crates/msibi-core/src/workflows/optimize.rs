use crate::core::pair::Pair;
use crate::core::state::State;
use crate::engine::backend::{RdfExtractor, SimulationBackend};
use crate::engine::config::OptimizeConfig;
use crate::engine::error::EngineError;
use crate::engine::optimizer::Optimizer;
use crate::engine::progress::ProgressReporter;
use tracing::{info, instrument};

pub use crate::engine::optimizer::OptimizationResult;
pub use crate::engine::record::RunOutcome;

/// Runs a complete MS-IBI optimization.
///
/// Validates the setup, then iterates: simulate every state against the
/// current potentials, aggregate the weighted Boltzmann corrections, update
/// each pair's table, and evaluate convergence. The returned result carries
/// the full iteration history whatever the outcome; an `Err` only signals a
/// problem starting the run or persisting its artifacts.
#[instrument(skip_all, name = "optimize_workflow")]
pub fn run<B, E>(
    states: Vec<State>,
    pairs: Vec<Pair>,
    config: OptimizeConfig,
    backend: &B,
    extractor: &E,
    reporter: &ProgressReporter,
) -> Result<OptimizationResult, EngineError>
where
    B: SimulationBackend,
    E: RdfExtractor<B::Trajectory>,
{
    info!(
        states = states.len(),
        pairs = pairs.len(),
        "Starting MS-IBI optimization workflow."
    );
    let optimizer = Optimizer::new(config, states, pairs, backend, extractor, reporter)?;
    let result = optimizer.run()?;
    info!(outcome = %result.outcome, "Workflow complete.");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::grid::RadialGrid;
    use crate::core::pair::PairKey;
    use crate::core::potential::PotentialTable;
    use crate::core::rdf::Rdf;
    use crate::engine::backend::{BackendError, PotentialSnapshot};
    use crate::engine::config::ConfigError;
    use crate::engine::progress::Progress;
    use std::sync::Mutex;

    /// Backend that always reproduces the target exactly.
    struct EchoBackend {
        rdf: Rdf,
    }

    impl SimulationBackend for EchoBackend {
        type Trajectory = ();

        fn run(
            &self,
            _state: &State,
            _potentials: &PotentialSnapshot,
            _timeout: Option<std::time::Duration>,
        ) -> Result<(), BackendError> {
            Ok(())
        }
    }

    impl RdfExtractor<()> for EchoBackend {
        fn compute_rdf(
            &self,
            _trajectory: &(),
            _pair: &PairKey,
            _grid: &RadialGrid,
        ) -> Result<Rdf, BackendError> {
            Ok(self.rdf.clone())
        }
    }

    fn setup() -> (RadialGrid, PairKey, Rdf) {
        let grid = RadialGrid::new(0.0, 1.0, 0.1).unwrap();
        let key = PairKey::new("A", "A");
        let target = Rdf::new(grid, vec![1.0; grid.len()]).unwrap();
        (grid, key, target)
    }

    #[test]
    fn a_perfect_backend_converges_and_reports_progress() {
        let (grid, key, target) = setup();
        let mut state = State::new("s0", 1.0, 1.0).unwrap();
        state.add_target(key.clone(), target.clone());
        let pairs = vec![Pair::new(key, PotentialTable::zeros(grid))];
        let config = OptimizeConfig::builder()
            .grid(grid)
            .convergence_patience(2)
            .max_iterations(5)
            .build()
            .unwrap();

        let events = Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event: Progress| {
            events.lock().unwrap().push(format!("{event:?}"));
        }));

        let backend = EchoBackend { rdf: target };
        let result = run(vec![state], pairs, config, &backend, &backend, &reporter).unwrap();

        assert!(matches!(
            result.outcome,
            RunOutcome::Converged { iterations: 2 }
        ));
        assert_eq!(result.history.len(), 2);

        drop(reporter);
        let events = events.into_inner().unwrap();
        assert!(events.iter().any(|e| e.contains("RunStart")));
        assert!(events.iter().any(|e| e.contains("IterationFinish")));
        assert!(events.iter().any(|e| e.contains("RunFinish")));
    }

    #[test]
    fn an_invalid_setup_fails_before_any_iteration() {
        let (grid, key, target) = setup();
        let mut state = State::new("s0", 1.0, 1.0).unwrap();
        state.add_target(key.clone(), target.clone());
        let config = OptimizeConfig::builder().grid(grid).build().unwrap();

        let backend = EchoBackend { rdf: target };
        let reporter = ProgressReporter::new();
        // No pairs configured.
        let result = run(vec![state], vec![], config, &backend, &backend, &reporter);
        assert!(matches!(
            result,
            Err(EngineError::Configuration(ConfigError::NoPairs))
        ));
    }
}
