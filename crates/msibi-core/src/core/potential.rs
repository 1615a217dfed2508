use crate::core::grid::{GridError, RadialGrid};
use crate::core::io::{self, TableIoError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum TableError {
    #[error("Separation {r} outside table range [{r_min}, {r_max}]")]
    OutOfRange { r: f64, r_min: f64, r_max: f64 },

    #[error("Update contains a non-finite value at r = {r}")]
    NonFiniteUpdate { r: f64 },

    #[error("Update length {actual} does not match table grid length {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Correction pipeline produced a non-finite value at r = {r}")]
    CorruptedTable { r: f64 },

    #[error(transparent)]
    Grid(#[from] GridError),
}

/// Behavior of [`PotentialTable::evaluate`] outside the tabulated range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Extrapolation {
    /// Out-of-range lookups are an error.
    Strict,
    /// Extend linearly using the slope of the nearest tabulated interval.
    Linear,
}

/// Functional form used to rebuild the short-range head of the table, where
/// sparse sampling makes the raw correction unreliable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HeadCorrection {
    /// Straight-line continuation of the first reliable interval.
    Linear,
    /// Repulsive decay `a·exp(-b·r)` anchored to the first reliable interval.
    /// Falls back to linear when the anchor values do not admit the fit.
    Exponential,
}

/// Post-update correction pipeline applied by [`PotentialTable::apply_update`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatePolicy {
    /// Below this separation the table is replaced by the head correction.
    pub head_cutoff: f64,
    pub head_correction: HeadCorrection,
    /// Above this separation the potential is smoothly switched to zero at
    /// the table's outer edge.
    pub r_switch: f64,
    /// Blend factor for the three-point moving-average smoothing, in `[0, 1]`.
    /// Zero disables smoothing entirely.
    pub smoothing_alpha: f64,
    /// Clamp for |V| after smoothing, preventing runaway values from feeding
    /// the next round of simulations.
    pub max_potential: Option<f64>,
}

/// Magnitude summary of one applied update, kept per pair for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct UpdateStats {
    pub max_abs_delta: f64,
    pub rms_delta: f64,
}

impl UpdateStats {
    pub fn from_delta(delta: &[f64]) -> Self {
        let max_abs_delta = delta.iter().fold(0.0_f64, |acc, d| acc.max(d.abs()));
        let rms_delta = if delta.is_empty() {
            0.0
        } else {
            (delta.iter().map(|d| d * d).sum::<f64>() / delta.len() as f64).sqrt()
        };
        Self {
            max_abs_delta,
            rms_delta,
        }
    }
}

/// A tabulated pairwise interaction potential over a [`RadialGrid`].
///
/// Invariant: the value vector always matches the grid length and holds only
/// finite values; a failed update leaves the table exactly as it was.
#[derive(Debug, Clone, PartialEq)]
pub struct PotentialTable {
    grid: RadialGrid,
    v: Vec<f64>,
    extrapolation: Extrapolation,
}

impl PotentialTable {
    pub fn new(grid: RadialGrid, v: Vec<f64>) -> Result<Self, GridError> {
        if v.len() != grid.len() {
            return Err(GridError::LengthMismatch {
                expected: grid.len(),
                actual: v.len(),
            });
        }
        for (i, &value) in v.iter().enumerate() {
            if !value.is_finite() {
                return Err(GridError::NonFiniteSample { r: grid.r(i) });
            }
        }
        Ok(Self {
            grid,
            v,
            extrapolation: Extrapolation::Strict,
        })
    }

    pub fn zeros(grid: RadialGrid) -> Self {
        Self {
            v: vec![0.0; grid.len()],
            grid,
            extrapolation: Extrapolation::Strict,
        }
    }

    pub fn with_extrapolation(mut self, extrapolation: Extrapolation) -> Self {
        self.extrapolation = extrapolation;
        self
    }

    #[inline]
    pub fn grid(&self) -> &RadialGrid {
        &self.grid
    }

    #[inline]
    pub fn values(&self) -> &[f64] {
        &self.v
    }

    /// Interpolated potential energy at separation `r`.
    pub fn evaluate(&self, r: f64) -> Result<f64, TableError> {
        match self.grid.bracket(r) {
            Some((idx, frac)) => Ok(self.v[idx] + frac * (self.v[idx + 1] - self.v[idx])),
            None => match self.extrapolation {
                Extrapolation::Strict => Err(TableError::OutOfRange {
                    r,
                    r_min: self.grid.r_min(),
                    r_max: self.grid.r_max(),
                }),
                Extrapolation::Linear => {
                    let dr = self.grid.dr();
                    let n = self.v.len();
                    if r < self.grid.r_min() {
                        let slope = (self.v[1] - self.v[0]) / dr;
                        Ok(self.v[0] + slope * (r - self.grid.r_min()))
                    } else {
                        let slope = (self.v[n - 1] - self.v[n - 2]) / dr;
                        Ok(self.v[n - 1] + slope * (r - self.grid.r_max()))
                    }
                }
            },
        }
    }

    /// Force `-dV/dr` on the grid: central differences in the interior,
    /// one-sided at the edges.
    pub fn forces(&self) -> Vec<f64> {
        let dr = self.grid.dr();
        let n = self.v.len();
        let mut f = Vec::with_capacity(n);
        f.push(-(self.v[1] - self.v[0]) / dr);
        for i in 1..n - 1 {
            f.push(-(self.v[i + 1] - self.v[i - 1]) / (2.0 * dr));
        }
        f.push(-(self.v[n - 1] - self.v[n - 2]) / dr);
        f
    }

    /// Interpolated force at separation `r`.
    pub fn force(&self, r: f64) -> Result<f64, TableError> {
        let forces = self.forces();
        match self.grid.bracket(r) {
            Some((idx, frac)) => Ok(forces[idx] + frac * (forces[idx + 1] - forces[idx])),
            None => Err(TableError::OutOfRange {
                r,
                r_min: self.grid.r_min(),
                r_max: self.grid.r_max(),
            }),
        }
    }

    /// Adds `delta` pointwise, then applies the policy's correction pipeline:
    /// head correction, tail correction, smoothing, and optional clipping.
    ///
    /// Returns the previous table for logging. A non-finite delta (or a
    /// pipeline result that fails the finiteness invariant) leaves the table
    /// untouched and reports the offending separation.
    pub fn apply_update(
        &mut self,
        delta: &[f64],
        policy: &UpdatePolicy,
    ) -> Result<PotentialTable, TableError> {
        if delta.len() != self.v.len() {
            return Err(TableError::LengthMismatch {
                expected: self.v.len(),
                actual: delta.len(),
            });
        }
        for (i, &d) in delta.iter().enumerate() {
            if !d.is_finite() {
                return Err(TableError::NonFiniteUpdate { r: self.grid.r(i) });
            }
        }

        let mut next: Vec<f64> = self
            .v
            .iter()
            .zip(delta.iter())
            .map(|(v, d)| v + d)
            .collect();

        apply_head_correction(&self.grid, &mut next, policy);
        apply_tail_correction(&self.grid, &mut next, policy.r_switch);
        apply_smoothing(&mut next, policy.smoothing_alpha);
        if let Some(max) = policy.max_potential {
            for value in &mut next {
                *value = value.clamp(-max, max);
            }
        }

        for (i, &value) in next.iter().enumerate() {
            if !value.is_finite() {
                return Err(TableError::CorruptedTable { r: self.grid.r(i) });
            }
        }

        let previous = std::mem::replace(&mut self.v, next);
        Ok(PotentialTable {
            grid: self.grid,
            v: previous,
            extrapolation: self.extrapolation,
        })
    }

    /// Writes the table in the `r,potential,force` layout consumed by
    /// tabulated-pair MD engines.
    pub fn write_csv_path(&self, path: &Path) -> Result<(), TableIoError> {
        let r = self.grid.r_values();
        let forces = self.forces();
        io::write_columns(path, &["r", "potential", "force"], &[&r, &self.v, &forces])
    }

    /// Reads a table written by [`Self::write_csv_path`] (any trailing columns
    /// beyond the potential are ignored and recomputed).
    pub fn from_csv_path(path: &Path) -> Result<Self, TableIoError> {
        let columns = io::read_columns(path, 2)?;
        let grid = io::grid_from_r_column(path, &columns[0])?;
        Ok(Self::new(grid, columns[1].clone())?)
    }
}

fn apply_head_correction(grid: &RadialGrid, v: &mut [f64], policy: &UpdatePolicy) {
    let anchor = grid.index_at_or_above(policy.head_cutoff);
    if anchor == 0 || anchor + 1 >= v.len() {
        return;
    }

    if policy.head_correction == HeadCorrection::Exponential {
        // V = a·exp(-b·r) through the anchor interval; only admissible for a
        // positive, decaying head.
        let (v1, v2) = (v[anchor], v[anchor + 1]);
        if v1 > 0.0 && v2 > 0.0 && v1 > v2 {
            let b = (v1 / v2).ln() / grid.dr();
            let a = v1 * (b * grid.r(anchor)).exp();
            let mut ok = true;
            let mut head: Vec<f64> = Vec::with_capacity(anchor);
            for i in 0..anchor {
                let value = a * (-b * grid.r(i)).exp();
                if !value.is_finite() {
                    ok = false;
                    break;
                }
                head.push(value);
            }
            if ok {
                v[..anchor].copy_from_slice(&head);
                return;
            }
        }
    }

    let slope = (v[anchor + 1] - v[anchor]) / grid.dr();
    for i in 0..anchor {
        v[i] = v[anchor] + slope * (grid.r(i) - grid.r(anchor));
    }
}

/// Multiplicative switching function that takes V and dV/dr smoothly to zero
/// at the table's outer edge, leaving everything below `r_switch` untouched.
fn apply_tail_correction(grid: &RadialGrid, v: &mut [f64], r_switch: f64) {
    let r_cut = grid.r_max();
    if r_switch >= r_cut {
        return;
    }
    let rc2 = r_cut * r_cut;
    let rs2 = r_switch * r_switch;
    let denom = (rc2 - rs2).powi(3);
    for i in 0..v.len() {
        let r = grid.r(i);
        if r < r_switch {
            continue;
        }
        let r2 = r * r;
        let s = (rc2 - r2).powi(2) * (rc2 + 2.0 * r2 - 3.0 * rs2) / denom;
        v[i] *= s;
    }
}

/// Three-point symmetric moving average blended by `alpha`; endpoints are
/// left untouched. `alpha = 0` is exactly the identity.
fn apply_smoothing(v: &mut [f64], alpha: f64) {
    if alpha <= 0.0 || v.len() < 3 {
        return;
    }
    let original = v.to_vec();
    for i in 1..v.len() - 1 {
        let window = (original[i - 1] + original[i] + original[i + 1]) / 3.0;
        v[i] = (1.0 - alpha) * original[i] + alpha * window;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const TOLERANCE: f64 = 1e-9;

    fn grid() -> RadialGrid {
        RadialGrid::new(0.0, 1.0, 0.1).unwrap()
    }

    /// Policy whose pipeline is the identity on tables that are already zero
    /// beyond `r_switch`.
    fn identity_policy(grid: &RadialGrid) -> UpdatePolicy {
        UpdatePolicy {
            head_cutoff: grid.r_min(),
            head_correction: HeadCorrection::Linear,
            r_switch: grid.r_max() - 2.0 * grid.dr(),
            smoothing_alpha: 0.0,
            max_potential: None,
        }
    }

    fn tail_zeroed_values(grid: &RadialGrid) -> Vec<f64> {
        let r_switch = grid.r_max() - 2.0 * grid.dr();
        grid.r_values()
            .iter()
            .map(|&r| if r < r_switch { (1.0 - r).powi(2) } else { 0.0 })
            .collect()
    }

    #[test]
    fn evaluate_interpolates_linearly_between_samples() {
        let grid = grid();
        let v: Vec<f64> = grid.r_values().iter().map(|r| 2.0 * r).collect();
        let table = PotentialTable::new(grid, v).unwrap();
        assert!((table.evaluate(0.35).unwrap() - 0.7).abs() < TOLERANCE);
        assert!((table.evaluate(1.0).unwrap() - 2.0).abs() < TOLERANCE);
    }

    #[test]
    fn evaluate_outside_range_fails_without_extrapolation() {
        let table = PotentialTable::zeros(grid());
        assert!(matches!(
            table.evaluate(1.5),
            Err(TableError::OutOfRange { .. })
        ));
    }

    #[test]
    fn evaluate_outside_range_extends_linearly_when_configured() {
        let grid = grid();
        let v: Vec<f64> = grid.r_values().iter().map(|r| 2.0 * r).collect();
        let table = PotentialTable::new(grid, v)
            .unwrap()
            .with_extrapolation(Extrapolation::Linear);
        assert!((table.evaluate(1.5).unwrap() - 3.0).abs() < TOLERANCE);
        assert!((table.evaluate(-0.5).unwrap() + 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn force_of_linear_potential_is_constant() {
        let grid = grid();
        let v: Vec<f64> = grid.r_values().iter().map(|r| 3.0 * r + 1.0).collect();
        let table = PotentialTable::new(grid, v).unwrap();
        assert!((table.force(0.0).unwrap() + 3.0).abs() < TOLERANCE);
        assert!((table.force(0.55).unwrap() + 3.0).abs() < TOLERANCE);
    }

    #[test]
    fn non_finite_update_is_rejected_and_table_retained() {
        let grid = grid();
        let mut table = PotentialTable::new(grid, tail_zeroed_values(&grid)).unwrap();
        let before = table.values().to_vec();
        let mut delta = vec![0.0; grid.len()];
        delta[4] = f64::NAN;

        let result = table.apply_update(&delta, &identity_policy(&grid));
        assert!(matches!(result, Err(TableError::NonFiniteUpdate { .. })));
        assert_eq!(table.values(), before.as_slice());
    }

    #[test]
    fn mismatched_update_length_is_rejected() {
        let grid = grid();
        let mut table = PotentialTable::zeros(grid);
        let result = table.apply_update(&[0.0; 3], &identity_policy(&grid));
        assert!(matches!(result, Err(TableError::LengthMismatch { .. })));
    }

    #[test]
    fn zero_update_with_identity_policy_leaves_table_unchanged() {
        let grid = grid();
        let mut table = PotentialTable::new(grid, tail_zeroed_values(&grid)).unwrap();
        let before = table.values().to_vec();
        let delta = vec![0.0; grid.len()];

        let previous = table.apply_update(&delta, &identity_policy(&grid)).unwrap();
        for (a, b) in table.values().iter().zip(before.iter()) {
            assert!((a - b).abs() < TOLERANCE);
        }
        assert_eq!(previous.values(), before.as_slice());
    }

    #[test]
    fn head_correction_linear_extends_first_reliable_interval() {
        let grid = grid();
        // Noisy head, clean line beyond the cutoff.
        let v: Vec<f64> = grid
            .r_values()
            .iter()
            .map(|&r| if r < 0.3 { 50.0 } else { 1.0 - r })
            .collect();
        let mut table = PotentialTable::new(grid, v).unwrap();
        let mut policy = identity_policy(&grid);
        policy.head_cutoff = 0.3;
        policy.r_switch = grid.r_max(); // isolate the head correction

        table.apply_update(&vec![0.0; grid.len()], &policy).unwrap();
        for i in 0..3 {
            let expected = 1.0 - grid.r(i);
            assert!((table.values()[i] - expected).abs() < TOLERANCE);
        }
    }

    #[test]
    fn head_correction_exponential_decays_from_anchor() {
        let grid = grid();
        let v: Vec<f64> = grid
            .r_values()
            .iter()
            .map(|&r| if r < 0.3 { 0.0 } else { (-2.0 * r).exp() })
            .collect();
        let mut table = PotentialTable::new(grid, v).unwrap();
        let mut policy = identity_policy(&grid);
        policy.head_cutoff = 0.3;
        policy.head_correction = HeadCorrection::Exponential;
        policy.r_switch = grid.r_max();

        table.apply_update(&vec![0.0; grid.len()], &policy).unwrap();
        for i in 0..3 {
            let expected = (-2.0 * grid.r(i)).exp();
            assert!((table.values()[i] - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn head_correction_exponential_falls_back_to_linear_for_negative_anchor() {
        let grid = grid();
        let v: Vec<f64> = grid.r_values().iter().map(|&r| -1.0 + r).collect();
        let mut table = PotentialTable::new(grid, v).unwrap();
        let mut policy = identity_policy(&grid);
        policy.head_cutoff = 0.3;
        policy.head_correction = HeadCorrection::Exponential;
        policy.r_switch = grid.r_max();

        table.apply_update(&vec![0.0; grid.len()], &policy).unwrap();
        // Linear fallback reproduces the original line exactly.
        for (i, &r) in grid.r_values().iter().enumerate() {
            assert!((table.values()[i] - (-1.0 + r)).abs() < TOLERANCE);
        }
    }

    #[test]
    fn tail_correction_vanishes_at_the_outer_edge() {
        let grid = grid();
        let mut table = PotentialTable::new(grid, vec![1.0; grid.len()]).unwrap();
        let mut policy = identity_policy(&grid);
        policy.r_switch = 0.7;

        table.apply_update(&vec![0.0; grid.len()], &policy).unwrap();
        let values = table.values();
        assert!(values[grid.len() - 1].abs() < TOLERANCE);
        // Untouched below the switch radius, monotonically suppressed above.
        assert!((values[5] - 1.0).abs() < TOLERANCE);
        assert!(values[8] < values[7]);
        assert!(values[9] < values[8]);
    }

    #[test]
    fn smoothing_with_full_alpha_averages_interior_points() {
        let grid = grid();
        let mut v = vec![0.0; grid.len()];
        v[5] = 3.0;
        let mut table = PotentialTable::new(grid, v).unwrap();
        let mut policy = identity_policy(&grid);
        policy.smoothing_alpha = 1.0;
        policy.r_switch = grid.r_max();

        table.apply_update(&vec![0.0; grid.len()], &policy).unwrap();
        assert!((table.values()[4] - 1.0).abs() < TOLERANCE);
        assert!((table.values()[5] - 1.0).abs() < TOLERANCE);
        assert!((table.values()[6] - 1.0).abs() < TOLERANCE);
    }

    #[test]
    fn clipping_bounds_the_updated_potential() {
        let grid = grid();
        let mut table = PotentialTable::zeros(grid);
        let mut policy = identity_policy(&grid);
        policy.r_switch = grid.r_max();
        policy.max_potential = Some(5.0);

        let delta: Vec<f64> = grid.r_values().iter().map(|&r| 100.0 * (r - 0.5)).collect();
        table.apply_update(&delta, &policy).unwrap();
        for &value in table.values() {
            assert!(value.abs() <= 5.0 + TOLERANCE);
        }
    }

    #[test]
    fn update_preserves_finiteness_over_full_pipeline() {
        let grid = grid();
        let mut table = PotentialTable::new(grid, tail_zeroed_values(&grid)).unwrap();
        let policy = UpdatePolicy {
            head_cutoff: 0.25,
            head_correction: HeadCorrection::Exponential,
            r_switch: 0.8,
            smoothing_alpha: 0.5,
            max_potential: Some(100.0),
        };
        let delta: Vec<f64> = grid
            .r_values()
            .iter()
            .map(|&r| 10.0 * (8.0 * r).sin())
            .collect();

        table.apply_update(&delta, &policy).unwrap();
        assert!(table.values().iter().all(|v| v.is_finite()));
    }

    #[test]
    fn csv_round_trip_reproduces_the_table() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pot.A-B.csv");
        let grid = grid();
        let v: Vec<f64> = grid.r_values().iter().map(|&r| (1.0 - r).powi(3)).collect();
        let table = PotentialTable::new(grid, v).unwrap();

        table.write_csv_path(&path).unwrap();
        let reloaded = PotentialTable::from_csv_path(&path).unwrap();

        assert!(table.grid().matches(reloaded.grid()));
        for (a, b) in table.values().iter().zip(reloaded.values().iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }
}
