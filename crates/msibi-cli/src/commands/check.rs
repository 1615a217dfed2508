use crate::cli::CheckArgs;
use crate::config::{Overrides, RunFile};
use crate::error::{CliError, Result};
use std::path::Path;
use tracing::info;

/// Resolves and cross-validates a run file without launching anything, then
/// prints the effective configuration.
pub fn run(args: CheckArgs) -> Result<()> {
    let file = RunFile::load(&args.config)?;
    let base_dir = args.config.parent().unwrap_or(Path::new("."));
    let setup = file.resolve(base_dir, &Overrides::default())?;
    setup
        .config
        .validate_setup(&setup.states, &setup.pairs)
        .map_err(|e| CliError::Core(e.into()))?;
    info!("Run file validated successfully.");

    let config = &setup.config;
    let grid = &config.grid;
    println!("Run file OK: {}", args.config.display());
    println!(
        "  grid: {} points, r in [{:.4}, {:.4}], dr = {:.4}",
        grid.len(),
        grid.r_min(),
        grid.r_max(),
        grid.dr()
    );
    println!(
        "  update: head cutoff {:.4} ({:?}), tail switch at {:.4}, smoothing alpha {:.2}",
        config.update.head_cutoff,
        config.update.head_correction,
        config.update.r_switch,
        config.update.smoothing_alpha
    );
    println!(
        "  convergence: threshold {:.3e}, patience {}, up to {} iteration(s)",
        config.convergence.threshold, config.convergence.patience, config.max_iterations
    );
    match &config.output_dir {
        Some(dir) => println!("  artifacts: {}", dir.display()),
        None => println!("  artifacts: disabled"),
    }

    for state in &setup.states {
        println!(
            "  state '{}': kT = {}, weight = {}, {} target(s)",
            state.name(),
            state.kt(),
            state.weight(),
            state.targets().len()
        );
    }
    for pair in &setup.pairs {
        let v = pair.potential().values();
        let (min, max) = v
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &x| {
                (lo.min(x), hi.max(x))
            });
        println!(
            "  pair {}: seed potential in [{:.4}, {:.4}]",
            pair.key(),
            min,
            max
        );
    }
    Ok(())
}
