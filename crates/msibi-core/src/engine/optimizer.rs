use crate::core::compare;
use crate::core::pair::{Pair, PairKey};
use crate::core::rdf::Rdf;
use crate::core::state::State;
use crate::engine::backend::{BackendError, PotentialSnapshot, RdfExtractor, SimulationBackend};
use crate::engine::config::OptimizeConfig;
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::record::{
    ArtifactWriter, FailureRecord, IterationRecord, MeasurementRecord, PairOutcome, RunHistory,
    RunMetadata, RunOutcome,
};
use itertools::Itertools;
use tracing::{info, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Where the run currently stands in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Initialized,
    Running,
    Converged,
    MaxIterationsReached,
    Failed,
}

/// Everything a finished run hands back: the terminal outcome, the full
/// iteration history, and the optimized pairs and states.
#[derive(Debug)]
pub struct OptimizationResult {
    pub outcome: RunOutcome,
    pub history: RunHistory,
    pub pairs: Vec<Pair>,
    pub states: Vec<State>,
}

/// The MS-IBI iteration driver.
///
/// Each iteration: snapshot the potentials, run every state's simulation
/// against that immutable snapshot (concurrently, with a barrier before any
/// update), aggregate the per-state Boltzmann corrections into one weighted
/// update per pair, apply it, and evaluate convergence. Pair updates only
/// ever happen after the barrier, so simulations never observe a table
/// mid-update.
pub struct Optimizer<'a, B, E>
where
    B: SimulationBackend,
    E: RdfExtractor<B::Trajectory>,
{
    config: OptimizeConfig,
    states: Vec<State>,
    pairs: Vec<Pair>,
    backend: &'a B,
    extractor: &'a E,
    reporter: &'a ProgressReporter<'a>,
    history: RunHistory,
    phase: RunPhase,
    below_threshold_streak: usize,
    failure_reason: Option<String>,
    artifacts: Option<ArtifactWriter>,
}

impl<'a, B, E> Optimizer<'a, B, E>
where
    B: SimulationBackend,
    E: RdfExtractor<B::Trajectory>,
{
    pub fn new(
        config: OptimizeConfig,
        states: Vec<State>,
        pairs: Vec<Pair>,
        backend: &'a B,
        extractor: &'a E,
        reporter: &'a ProgressReporter<'a>,
    ) -> Result<Self, EngineError> {
        config.validate_setup(&states, &pairs)?;

        let artifacts = match &config.output_dir {
            Some(dir) => {
                let writer = ArtifactWriter::new(dir)?;
                writer.write_metadata(&RunMetadata::from_setup(&config, &states))?;
                Some(writer)
            }
            None => None,
        };

        info!(
            states = states.iter().map(State::name).join(", "),
            pairs = pairs.iter().map(|p| p.key().to_string()).join(", "),
            max_iterations = config.max_iterations,
            "Optimizer initialized."
        );

        Ok(Self {
            config,
            states,
            pairs,
            backend,
            extractor,
            reporter,
            history: RunHistory::new(),
            phase: RunPhase::Initialized,
            below_threshold_streak: 0,
            failure_reason: None,
            artifacts,
        })
    }

    #[inline]
    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    #[inline]
    pub fn history(&self) -> &RunHistory {
        &self.history
    }

    /// Drives iterations until the run reaches a terminal phase. The full
    /// history is returned regardless of how the run ends; only startup and
    /// artifact-persistence problems surface as errors.
    pub fn run(mut self) -> Result<OptimizationResult, EngineError> {
        self.reporter.report(Progress::RunStart {
            max_iterations: self.config.max_iterations as u64,
        });
        self.phase = RunPhase::Running;
        while self.phase == RunPhase::Running {
            self.step()?;
        }
        self.reporter.report(Progress::RunFinish);

        let iterations = self.history.len();
        let outcome = match self.phase {
            RunPhase::Converged => RunOutcome::Converged { iterations },
            RunPhase::MaxIterationsReached => RunOutcome::MaxIterationsReached { iterations },
            RunPhase::Failed => RunOutcome::Failed {
                iterations,
                reason: self
                    .failure_reason
                    .take()
                    .unwrap_or_else(|| "unspecified failure".to_string()),
            },
            RunPhase::Initialized | RunPhase::Running => {
                return Err(EngineError::Internal(
                    "run loop exited without a terminal phase".to_string(),
                ));
            }
        };
        info!(outcome = %outcome, "Optimization finished.");

        Ok(OptimizationResult {
            outcome,
            history: self.history,
            pairs: self.pairs,
            states: self.states,
        })
    }

    /// Executes one full iteration of the state machine.
    pub fn step(&mut self) -> Result<(), EngineError> {
        let index = self.history.len();
        self.reporter.report(Progress::IterationStart { index });
        info!(iteration = index, "-------- Iteration --------");

        let snapshot: PotentialSnapshot = self
            .pairs
            .iter()
            .map(|p| (p.key().clone(), p.potential().clone()))
            .collect();
        for state in &mut self.states {
            state.clear_measurements();
        }

        let results = self.run_simulations(&snapshot);
        let mut failures = Vec::new();
        let mut failure_reason: Option<String> = None;
        for (idx, result) in results.into_iter().enumerate() {
            let state = &mut self.states[idx];
            match result {
                Ok(measurements) => {
                    state.reset_failures();
                    for (pair, rdf) in measurements {
                        state.record_measurement(pair, rdf);
                    }
                    self.reporter.report(Progress::StateFinished {
                        state: self.states[idx].name().to_string(),
                        failed: false,
                    });
                }
                Err(err) => {
                    state.record_failure();
                    warn!(
                        state = state.name(),
                        error = %err,
                        "State simulation failed; excluding it from this iteration."
                    );
                    failures.push(FailureRecord {
                        state: state.name().to_string(),
                        reason: err.to_string(),
                    });
                    if state.consecutive_failures() >= self.config.max_state_failures {
                        failure_reason = Some(
                            EngineError::RepeatedStateFailure {
                                state: state.name().to_string(),
                                count: state.consecutive_failures(),
                            }
                            .to_string(),
                        );
                    }
                    self.reporter.report(Progress::StateFinished {
                        state: self.states[idx].name().to_string(),
                        failed: true,
                    });
                }
            }
        }

        // Barrier passed: every state has reported. Updates from here on are
        // serial per pair.
        let mut measurements = Vec::new();
        let mut pair_outcomes = Vec::new();
        let mut aggregate_num = 0.0;
        let mut aggregate_weight = 0.0;

        for i in 0..self.pairs.len() {
            let key = self.pairs[i].key().clone();
            let mut total_weight = 0.0;
            let mut delta = vec![0.0; self.config.grid.len()];

            for state in &self.states {
                let (Some(target), Some(measured)) = (state.target(&key), state.measurement(&key))
                else {
                    continue;
                };
                let divergence =
                    compare::divergence(measured, target, self.config.divergence_weighting)?;
                let fit_quality = compare::fit_quality(measured, target)?;
                measurements.push(MeasurementRecord {
                    state: state.name().to_string(),
                    pair: key.clone(),
                    divergence,
                    fit_quality,
                });

                if state.weight() > 0.0 {
                    let correction = compare::correction(
                        measured,
                        target,
                        state.kt(),
                        self.config.exclusion_epsilon,
                    )?;
                    for (d, c) in delta.iter_mut().zip(correction.iter()) {
                        *d += state.weight() * c;
                    }
                    total_weight += state.weight();
                    aggregate_num += state.weight() * divergence;
                    aggregate_weight += state.weight();
                }
            }

            let pair = &mut self.pairs[i];
            if total_weight <= 0.0 {
                pair.record_miss();
                warn!(pair = %key, "No state contributed this iteration; potential left unchanged.");
                pair_outcomes.push(PairOutcome::Skipped { pair: key.clone() });
            } else {
                // Failed states were excluded above, so dividing by the
                // contributed weight renormalizes the remainder to one.
                for d in &mut delta {
                    *d /= total_weight;
                }
                match pair.apply_update(&delta, &self.config.update) {
                    Ok(stats) => {
                        pair_outcomes.push(PairOutcome::Updated {
                            pair: key.clone(),
                            stats,
                        });
                    }
                    Err(err) => {
                        warn!(
                            pair = %key,
                            error = %err,
                            "Update rejected; previous potential retained."
                        );
                        pair_outcomes.push(PairOutcome::Rejected {
                            pair: key.clone(),
                            reason: err.to_string(),
                        });
                    }
                }
            }

            let stalled = self.pairs[i].iterations_without_update();
            if stalled >= self.config.max_pair_misses && failure_reason.is_none() {
                failure_reason = Some(
                    EngineError::StuckPair {
                        pair: key,
                        count: stalled,
                    }
                    .to_string(),
                );
            }
        }

        let aggregate_divergence =
            (aggregate_weight > 0.0).then(|| aggregate_num / aggregate_weight);

        if failure_reason.is_none() {
            match aggregate_divergence {
                Some(aggregate) if aggregate < self.config.convergence.threshold => {
                    self.below_threshold_streak += 1;
                }
                _ => self.below_threshold_streak = 0,
            }
        }

        let record = IterationRecord {
            index,
            measurements,
            failures,
            pair_outcomes,
            aggregate_divergence,
        };
        if let Some(writer) = &self.artifacts {
            writer.write_iteration(&record, &self.pairs, &self.states)?;
        }
        self.reporter.report(Progress::IterationFinish {
            index,
            aggregate_divergence,
        });
        self.history.push(record);

        self.phase = if let Some(reason) = failure_reason {
            self.failure_reason = Some(reason);
            RunPhase::Failed
        } else if self.below_threshold_streak >= self.config.convergence.patience {
            RunPhase::Converged
        } else if self.history.len() >= self.config.max_iterations {
            RunPhase::MaxIterationsReached
        } else {
            RunPhase::Running
        };
        Ok(())
    }

    /// Runs every state's simulation against the shared snapshot. All states
    /// finish (or fail) before this returns, forming the iteration barrier.
    fn run_simulations(
        &self,
        snapshot: &PotentialSnapshot,
    ) -> Vec<Result<Vec<(PairKey, Rdf)>, BackendError>> {
        self.reporter.report(Progress::SimulationsStart {
            total_states: self.states.len() as u64,
        });

        let backend = self.backend;
        let extractor = self.extractor;
        let grid = self.config.grid;
        let timeout = self.config.simulation_timeout;
        let run_one = |state: &State| -> Result<Vec<(PairKey, Rdf)>, BackendError> {
            let trajectory = backend.run(state, snapshot, timeout)?;
            let mut measured = Vec::new();
            for pair in state.targets().keys() {
                let rdf = extractor.compute_rdf(&trajectory, pair, &grid)?;
                measured.push((pair.clone(), rdf));
            }
            Ok(measured)
        };

        #[cfg(not(feature = "parallel"))]
        let results: Vec<_> = self.states.iter().map(run_one).collect();

        #[cfg(feature = "parallel")]
        let results: Vec<_> = self.states.par_iter().map(run_one).collect();

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::grid::RadialGrid;
    use crate::core::pair::PairKey;
    use crate::core::potential::PotentialTable;
    use std::collections::{HashMap, HashSet};

    const TOLERANCE: f64 = 1e-9;

    fn grid() -> RadialGrid {
        RadialGrid::new(0.0, 1.0, 0.1).unwrap()
    }

    /// Reference potential that is exactly zero beyond the tail switch, so
    /// the tail correction is the identity on it.
    fn reference_potential(grid: &RadialGrid) -> Vec<f64> {
        grid.r_values()
            .iter()
            .map(|&r| if r < 0.8 { (0.8 - r) * (0.8 - r) } else { 0.0 })
            .collect()
    }

    fn rdf_from_potential(grid: &RadialGrid, v: &[f64], kt: f64) -> Rdf {
        let g = v.iter().map(|v| (-v / kt).exp()).collect();
        Rdf::new(*grid, g).unwrap()
    }

    fn base_config(grid: RadialGrid) -> crate::engine::config::OptimizeConfigBuilder {
        OptimizeConfig::builder().grid(grid).r_switch(0.8)
    }

    /// Idealized backend: the "simulation" returns the exact mean-field RDF
    /// `g(r) = exp(-V(r)/kT)` implied by the snapshot it was handed.
    struct MeanFieldBackend;

    struct MeanFieldTrajectory {
        kt: f64,
        potentials: PotentialSnapshot,
    }

    impl SimulationBackend for MeanFieldBackend {
        type Trajectory = MeanFieldTrajectory;

        fn run(
            &self,
            state: &State,
            potentials: &PotentialSnapshot,
            _timeout: Option<std::time::Duration>,
        ) -> Result<MeanFieldTrajectory, BackendError> {
            Ok(MeanFieldTrajectory {
                kt: state.kt(),
                potentials: potentials.clone(),
            })
        }
    }

    impl RdfExtractor<MeanFieldTrajectory> for MeanFieldBackend {
        fn compute_rdf(
            &self,
            trajectory: &MeanFieldTrajectory,
            pair: &PairKey,
            grid: &RadialGrid,
        ) -> Result<Rdf, BackendError> {
            let table = trajectory
                .potentials
                .get(pair)
                .ok_or_else(|| BackendError::Other(format!("no snapshot for pair {pair}")))?;
            let g = table.values().iter().map(|v| (-v / trajectory.kt).exp()).collect();
            Rdf::new(*grid, g).map_err(|e| BackendError::Other(e.to_string()))
        }
    }

    /// Canned backend: returns preconfigured RDFs per (state, pair) and can
    /// be told to fail named states.
    struct FixedBackend {
        responses: HashMap<String, HashMap<PairKey, Rdf>>,
        fail: HashSet<String>,
    }

    struct FixedTrajectory {
        state: String,
    }

    impl SimulationBackend for FixedBackend {
        type Trajectory = FixedTrajectory;

        fn run(
            &self,
            state: &State,
            _potentials: &PotentialSnapshot,
            _timeout: Option<std::time::Duration>,
        ) -> Result<FixedTrajectory, BackendError> {
            if self.fail.contains(state.name()) {
                return Err(BackendError::Other("injected failure".to_string()));
            }
            Ok(FixedTrajectory {
                state: state.name().to_string(),
            })
        }
    }

    impl RdfExtractor<FixedTrajectory> for FixedBackend {
        fn compute_rdf(
            &self,
            trajectory: &FixedTrajectory,
            pair: &PairKey,
            _grid: &RadialGrid,
        ) -> Result<Rdf, BackendError> {
            self.responses
                .get(&trajectory.state)
                .and_then(|per_pair| per_pair.get(pair))
                .cloned()
                .ok_or_else(|| BackendError::Other(format!("no canned RDF for {pair}")))
        }
    }

    fn state_with_target(name: &str, kt: f64, weight: f64, pair: &PairKey, target: Rdf) -> State {
        let mut state = State::new(name, kt, weight).unwrap();
        state.add_target(pair.clone(), target);
        state
    }

    #[test]
    fn converges_on_a_self_consistent_target() {
        let g = grid();
        let key = PairKey::new("A", "A");
        let v_star = reference_potential(&g);
        let target = rdf_from_potential(&g, &v_star, 1.0);

        let config = base_config(g)
            .convergence_threshold(1e-8)
            .convergence_patience(2)
            .max_iterations(20)
            .build()
            .unwrap();
        let states = vec![state_with_target("s0", 1.0, 1.0, &key, target)];
        let pairs = vec![Pair::new(key.clone(), PotentialTable::zeros(g))];

        let backend = MeanFieldBackend;
        let reporter = ProgressReporter::new();
        let optimizer =
            Optimizer::new(config, states, pairs, &backend, &backend, &reporter).unwrap();
        let result = optimizer.run().unwrap();

        assert!(matches!(result.outcome, RunOutcome::Converged { .. }));
        // The divergence trends to zero: first iteration sees the flat seed,
        // later iterations see the recovered reference potential.
        let divergences: Vec<f64> = result
            .history
            .records()
            .iter()
            .filter_map(|r| r.aggregate_divergence)
            .collect();
        assert!(divergences[0] > 1e-3);
        assert!(*divergences.last().unwrap() < 1e-8);

        // And the recovered potential matches the reference below the tail.
        let recovered = result.pairs[0].potential();
        for (i, &r) in g.r_values().iter().enumerate() {
            if r < 0.8 {
                assert!((recovered.values()[i] - v_star[i]).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn self_inverted_seed_produces_a_near_zero_first_correction() {
        let g = grid();
        let key = PairKey::new("A", "A");
        let v_star = reference_potential(&g);
        let target = rdf_from_potential(&g, &v_star, 1.0);
        let seed = target.boltzmann_inversion(1.0, 1e-12).unwrap();

        let config = base_config(g).max_iterations(1).build().unwrap();
        let states = vec![state_with_target("s0", 1.0, 1.0, &key, target)];
        let pairs = vec![Pair::new(key.clone(), seed)];

        let backend = MeanFieldBackend;
        let reporter = ProgressReporter::new();
        let optimizer =
            Optimizer::new(config, states, pairs, &backend, &backend, &reporter).unwrap();
        let result = optimizer.run().unwrap();

        match &result.history.records()[0].pair_outcomes[0] {
            PairOutcome::Updated { stats, .. } => {
                assert!(stats.max_abs_delta < 1e-9);
            }
            other => panic!("expected an update, got {other:?}"),
        }
    }

    #[test]
    fn two_state_corrections_aggregate_by_normalized_weight() {
        let g = grid();
        let key = PairKey::new("A", "A");
        let target = Rdf::new(g, vec![1.0; g.len()]).unwrap();
        let deviating = Rdf::new(g, vec![1.3; g.len()]).unwrap();

        let mut responses = HashMap::new();
        responses.insert("on-target".to_string(), HashMap::from([(key.clone(), target.clone())]));
        responses.insert("deviating".to_string(), HashMap::from([(key.clone(), deviating)]));
        let backend = FixedBackend {
            responses,
            fail: HashSet::new(),
        };

        let config = base_config(g).max_iterations(1).build().unwrap();
        let states = vec![
            state_with_target("on-target", 1.0, 0.7, &key, target.clone()),
            state_with_target("deviating", 1.0, 0.3, &key, target),
        ];
        let pairs = vec![Pair::new(key.clone(), PotentialTable::zeros(g))];

        let reporter = ProgressReporter::new();
        let optimizer =
            Optimizer::new(config, states, pairs, &backend, &backend, &reporter).unwrap();
        let result = optimizer.run().unwrap();

        // The on-target state contributes zero, so the aggregate equals
        // 0.3 x the deviating state's correction.
        let expected = 0.3 * 1.3_f64.ln();
        let v = result.pairs[0].potential().values();
        assert!((v[3] - expected).abs() < TOLERANCE);
        assert!((v[5] - expected).abs() < TOLERANCE);
    }

    #[test]
    fn failed_state_is_excluded_and_weights_renormalized() {
        let g = grid();
        let key = PairKey::new("A", "A");
        let target = Rdf::new(g, vec![1.0; g.len()]).unwrap();
        let deviating = Rdf::new(g, vec![1.5; g.len()]).unwrap();

        let mut responses = HashMap::new();
        responses.insert("a".to_string(), HashMap::from([(key.clone(), target.clone())]));
        responses.insert("b".to_string(), HashMap::from([(key.clone(), deviating)]));
        let backend = FixedBackend {
            responses,
            fail: HashSet::from(["c".to_string()]),
        };

        let config = base_config(g)
            .max_iterations(1)
            .max_state_failures(5)
            .build()
            .unwrap();
        let states = vec![
            state_with_target("a", 1.0, 0.5, &key, target.clone()),
            state_with_target("b", 1.0, 0.3, &key, target.clone()),
            state_with_target("c", 1.0, 0.2, &key, target),
        ];
        let pairs = vec![Pair::new(key.clone(), PotentialTable::zeros(g))];

        let reporter = ProgressReporter::new();
        let optimizer =
            Optimizer::new(config, states, pairs, &backend, &backend, &reporter).unwrap();
        let result = optimizer.run().unwrap();

        // Renormalized over the two survivors: (0.3 / 0.8) x ln(1.5).
        let expected = 0.3 / 0.8 * 1.5_f64.ln();
        let v = result.pairs[0].potential().values();
        assert!((v[4] - expected).abs() < TOLERANCE);

        let record = &result.history.records()[0];
        assert_eq!(record.failures.len(), 1);
        assert_eq!(record.failures[0].state, "c");
        assert_eq!(record.measurements.len(), 2);
    }

    #[test]
    fn repeated_state_failures_abort_the_run() {
        let g = grid();
        let key = PairKey::new("A", "A");
        let target = Rdf::new(g, vec![1.0; g.len()]).unwrap();

        let backend = FixedBackend {
            responses: HashMap::new(),
            fail: HashSet::from(["s0".to_string()]),
        };
        let config = base_config(g)
            .max_iterations(10)
            .max_state_failures(2)
            .max_pair_misses(10)
            .build()
            .unwrap();
        let states = vec![state_with_target("s0", 1.0, 1.0, &key, target)];
        let pairs = vec![Pair::new(key, PotentialTable::zeros(g))];

        let reporter = ProgressReporter::new();
        let optimizer =
            Optimizer::new(config, states, pairs, &backend, &backend, &reporter).unwrap();
        let result = optimizer.run().unwrap();

        match &result.outcome {
            RunOutcome::Failed { iterations, reason } => {
                assert_eq!(*iterations, 2);
                assert!(reason.contains("consecutive"));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(result.history.records()[0].aggregate_divergence.is_none());
        assert!(matches!(
            result.history.records()[0].pair_outcomes[0],
            PairOutcome::Skipped { .. }
        ));
    }

    #[test]
    fn pair_without_contributions_eventually_fails_as_stuck() {
        let g = grid();
        let key_aa = PairKey::new("A", "A");
        let key_bb = PairKey::new("B", "B");
        let target = Rdf::new(g, vec![1.0; g.len()]).unwrap();

        let mut responses = HashMap::new();
        responses.insert(
            "alive".to_string(),
            HashMap::from([(key_aa.clone(), target.clone())]),
        );
        let backend = FixedBackend {
            responses,
            fail: HashSet::from(["dead".to_string()]),
        };

        let config = base_config(g)
            .max_iterations(10)
            .max_state_failures(10)
            .max_pair_misses(2)
            .build()
            .unwrap();
        let states = vec![
            state_with_target("alive", 1.0, 1.0, &key_aa, target.clone()),
            state_with_target("dead", 1.0, 1.0, &key_bb, target),
        ];
        let pairs = vec![
            Pair::new(key_aa, PotentialTable::zeros(g)),
            Pair::new(key_bb.clone(), PotentialTable::zeros(g)),
        ];

        let reporter = ProgressReporter::new();
        let optimizer =
            Optimizer::new(config, states, pairs, &backend, &backend, &reporter).unwrap();
        let result = optimizer.run().unwrap();

        match &result.outcome {
            RunOutcome::Failed { iterations, reason } => {
                assert_eq!(*iterations, 2);
                assert!(reason.contains(&key_bb.to_string()));
            }
            other => panic!("expected a stuck-pair failure, got {other:?}"),
        }
    }

    #[test]
    fn unsampled_target_head_is_governed_by_the_head_correction() {
        let g = grid();
        let key = PairKey::new("A", "A");
        // Target is unsampled below r0 = 0.3; measured deviates everywhere.
        let target_g: Vec<f64> = g
            .r_values()
            .iter()
            .map(|&r| if r < 0.3 { 0.0 } else { 1.0 })
            .collect();
        let target = Rdf::new(g, target_g).unwrap();
        let measured = Rdf::new(g, vec![1.2; g.len()]).unwrap();

        let responses = HashMap::from([(
            "s0".to_string(),
            HashMap::from([(key.clone(), measured)]),
        )]);
        let backend = FixedBackend {
            responses,
            fail: HashSet::new(),
        };

        let config = base_config(g)
            .head_cutoff(0.3)
            .max_iterations(3)
            .convergence_threshold(1e-12)
            .build()
            .unwrap();
        let states = vec![state_with_target("s0", 1.0, 1.0, &key, target)];
        let seed: Vec<f64> = g.r_values().iter().map(|&r| 1.0 - r).collect();
        let pairs = vec![Pair::new(key, PotentialTable::new(g, seed).unwrap())];

        let reporter = ProgressReporter::new();
        let optimizer =
            Optimizer::new(config, states, pairs, &backend, &backend, &reporter).unwrap();
        let result = optimizer.run().unwrap();

        // Below r0 the table must lie on the line extended from the first
        // reliable interval, every iteration: the correction never touched it.
        let v = result.pairs[0].potential().values();
        let slope = (v[4] - v[3]) / g.dr();
        for i in 0..3 {
            let expected = v[3] + slope * (g.r(i) - g.r(3));
            assert!((v[i] - expected).abs() < TOLERANCE);
        }
    }
}
