use crate::cli::RunArgs;
use crate::config::{Overrides, RunFile, RunSetup};
use crate::error::{CliError, Result};
use crate::progress::CliProgressHandler;
use msibi::engine::progress::ProgressReporter;
use msibi::engine::record::RunOutcome;
use msibi::workflows;
use std::path::Path;
use tracing::{info, warn};

pub fn run(args: RunArgs) -> Result<()> {
    let file = RunFile::load(&args.config)?;
    let base_dir = args.config.parent().unwrap_or(Path::new("."));
    let overrides = Overrides {
        output_dir: args.output.clone(),
        max_iterations: args.max_iterations,
        threshold: args.threshold,
        timeout: args.timeout,
    };
    let RunSetup {
        config,
        states,
        pairs,
        backend,
    } = file.resolve(base_dir, &overrides)?;

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    println!("Starting MS-IBI optimization...");
    info!("Invoking the core optimization workflow...");

    let result = workflows::optimize::run(states, pairs, config, &backend, &backend, &reporter)?;

    if let Some(record) = result.history.last() {
        if let Some(divergence) = record.aggregate_divergence {
            println!("Final aggregate divergence: {:.6e}", divergence);
        }
    }

    match &result.outcome {
        RunOutcome::Converged { iterations } => {
            println!("✓ Converged after {} iteration(s).", iterations);
            Ok(())
        }
        RunOutcome::MaxIterationsReached { iterations } => {
            warn!("Run ended at the iteration cap without converging.");
            println!(
                "Finished without convergence: iteration cap of {} reached.",
                iterations
            );
            Ok(())
        }
        RunOutcome::Failed { reason, .. } => Err(CliError::Run(reason.clone())),
    }
}
