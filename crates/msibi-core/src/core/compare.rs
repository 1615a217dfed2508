//! Structural comparison between a measured and a target RDF: the incremental
//! Boltzmann-inversion correction that drives the potential update, and the
//! scalar divergence metrics used for convergence decisions and reporting.
//!
//! Both sides of every comparison must share one grid; measured data is
//! resampled onto the target's grid beforehand (see [`Rdf::resample_onto`]),
//! since the target defines the ground-truth support.

use crate::core::grid::GridError;
use crate::core::rdf::Rdf;
use serde::{Deserialize, Serialize};

/// Default threshold below which an RDF bin is treated as unsampled and
/// excluded from the correction.
pub const DEFAULT_EXCLUSION_EPSILON: f64 = 1e-6;

/// Weighting applied to the squared-difference divergence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DivergenceWeighting {
    Uniform,
    /// Weight each bin by r², reflecting the radial shell volume it samples.
    RSquared,
}

fn check_grids(measured: &Rdf, target: &Rdf) -> Result<(), GridError> {
    if measured.grid().matches(target.grid()) {
        Ok(())
    } else {
        Err(measured.grid().mismatch_error(target.grid()))
    }
}

/// The Boltzmann-inversion correction `Δ(r) = kT·ln(measured(r)/target(r))`.
///
/// Bins where either distribution falls below `epsilon` carry no reliable
/// statistics; they contribute a zero correction so the previous potential
/// value (or the head correction) governs that region.
pub fn correction(
    measured: &Rdf,
    target: &Rdf,
    kt: f64,
    epsilon: f64,
) -> Result<Vec<f64>, GridError> {
    check_grids(measured, target)?;
    Ok(measured
        .g()
        .iter()
        .zip(target.g().iter())
        .map(|(&m, &t)| {
            if m < epsilon || t < epsilon {
                0.0
            } else {
                kt * (m / t).ln()
            }
        })
        .collect())
}

/// Weighted mean squared difference between measured and target, used purely
/// for convergence evaluation and reporting.
pub fn divergence(
    measured: &Rdf,
    target: &Rdf,
    weighting: DivergenceWeighting,
) -> Result<f64, GridError> {
    check_grids(measured, target)?;
    let grid = target.grid();
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for (i, (&m, &t)) in measured.g().iter().zip(target.g().iter()).enumerate() {
        let w = match weighting {
            DivergenceWeighting::Uniform => 1.0,
            DivergenceWeighting::RSquared => {
                let r = grid.r(i);
                r * r
            }
        };
        weighted_sum += w * (t - m) * (t - m);
        weight_total += w;
    }
    if weight_total == 0.0 {
        return Ok(0.0);
    }
    Ok(weighted_sum / weight_total)
}

/// The fit score `1 − Σ(t−m)² / Σ(t²+m²)` in `[0, 1]`, with 1 a perfect
/// match. Reported per (state, pair) each iteration alongside the divergence.
pub fn fit_quality(measured: &Rdf, target: &Rdf) -> Result<f64, GridError> {
    check_grids(measured, target)?;
    let mut num = 0.0;
    let mut denom = 0.0;
    for (&m, &t) in measured.g().iter().zip(target.g().iter()) {
        num += (t - m) * (t - m);
        denom += t * t + m * m;
    }
    if denom == 0.0 {
        return Ok(1.0);
    }
    Ok(1.0 - num / denom)
}
