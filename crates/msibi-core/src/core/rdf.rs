use crate::core::grid::{GridError, RadialGrid};
use crate::core::io::{self, TableIoError};
use crate::core::potential::PotentialTable;
use std::path::Path;

/// A radial distribution function g(r) sampled on a [`RadialGrid`].
///
/// Invariant: one finite, non-negative value per grid point.
#[derive(Debug, Clone, PartialEq)]
pub struct Rdf {
    grid: RadialGrid,
    g: Vec<f64>,
}

impl Rdf {
    pub fn new(grid: RadialGrid, g: Vec<f64>) -> Result<Self, GridError> {
        if g.len() != grid.len() {
            return Err(GridError::LengthMismatch {
                expected: grid.len(),
                actual: g.len(),
            });
        }
        for (i, &value) in g.iter().enumerate() {
            if !value.is_finite() {
                return Err(GridError::NonFiniteSample { r: grid.r(i) });
            }
            if value < 0.0 {
                return Err(GridError::NegativeSample {
                    r: grid.r(i),
                    value,
                });
            }
        }
        Ok(Self { grid, g })
    }

    #[inline]
    pub fn grid(&self) -> &RadialGrid {
        &self.grid
    }

    #[inline]
    pub fn g(&self) -> &[f64] {
        &self.g
    }

    /// Linearly resamples this RDF onto `target` (measured data is always
    /// moved onto the target's grid, never the reverse). Outside the source
    /// extent the boundary value is held.
    pub fn resample_onto(&self, target: &RadialGrid) -> Result<Rdf, GridError> {
        if self.grid.matches(target) {
            return Ok(self.clone());
        }
        let n = self.g.len();
        let g = target
            .r_values()
            .into_iter()
            .map(|r| match self.grid.bracket(r) {
                Some((idx, frac)) => self.g[idx] + frac * (self.g[idx + 1] - self.g[idx]),
                None if r < self.grid.r_min() => self.g[0],
                None => self.g[n - 1],
            })
            .collect();
        Rdf::new(*target, g)
    }

    /// Direct Boltzmann inversion `V(r) = -kT·ln g(r)`, the standard seed for
    /// an iterative run.
    ///
    /// Bins with `g < epsilon` carry no structural information; the leading
    /// unsampled run is rebuilt by linear extrapolation from the first two
    /// reliable bins, interior gaps are bridged by interpolation, and an
    /// unsampled tail decays to zero.
    pub fn boltzmann_inversion(&self, kt: f64, epsilon: f64) -> Result<PotentialTable, GridError> {
        let mut v: Vec<Option<f64>> = self
            .g
            .iter()
            .map(|&g| (g >= epsilon).then(|| -kt * g.ln()))
            .collect();

        let first = v.iter().position(Option::is_some);
        let last = v.iter().rposition(Option::is_some);
        let (first, last) = match (first, last) {
            (Some(first), Some(last)) if last > first => (first, last),
            _ => {
                // Nothing reliable to invert.
                return Err(GridError::NonFiniteSample { r: self.grid.r(0) });
            }
        };

        let dr = self.grid.dr();
        let head_slope = match (v[first], v[first + 1]) {
            (Some(a), Some(b)) => (b - a) / dr,
            // First reliable bin is isolated; continue flat.
            _ => 0.0,
        };
        for i in 0..first {
            let anchor = v[first].unwrap_or(0.0);
            v[i] = Some(anchor + head_slope * (self.grid.r(i) - self.grid.r(first)));
        }
        for i in last + 1..v.len() {
            v[i] = Some(0.0);
        }

        // Bridge interior gaps between reliable bins.
        let mut i = first;
        while i < last {
            if v[i + 1].is_some() {
                i += 1;
                continue;
            }
            let gap_end = (i + 2..=last)
                .find(|&j| v[j].is_some())
                .unwrap_or(last);
            let start_value = v[i].unwrap_or(0.0);
            let end_value = v[gap_end].unwrap_or(0.0);
            let span = (gap_end - i) as f64;
            for (step, j) in (i + 1..gap_end).enumerate() {
                v[j] = Some(start_value + (end_value - start_value) * (step + 1) as f64 / span);
            }
            i = gap_end;
        }

        let values: Vec<f64> = v.into_iter().map(|value| value.unwrap_or(0.0)).collect();
        PotentialTable::new(self.grid, values)
    }

    pub fn write_csv_path(&self, path: &Path) -> Result<(), TableIoError> {
        let r = self.grid.r_values();
        io::write_columns(path, &["r", "g"], &[&r, &self.g])
    }

    pub fn from_csv_path(path: &Path) -> Result<Self, TableIoError> {
        let columns = io::read_columns(path, 2)?;
        let grid = io::grid_from_r_column(path, &columns[0])?;
        Ok(Self::new(grid, columns[1].clone())?)
    }
}
