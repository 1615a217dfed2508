use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Relative tolerance used when deciding whether two grids coincide.
const GRID_MATCH_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GridError {
    #[error("Invalid grid spacing {dr}: spacing must be finite and positive")]
    InvalidSpacing { dr: f64 },

    #[error("Invalid grid range [{r_min}, {r_max}]: range must be finite with r_max > r_min")]
    InvalidRange { r_min: f64, r_max: f64 },

    #[error("A grid needs at least two points, got {n_points}")]
    TooFewPoints { n_points: usize },

    #[error("Sample count {actual} does not match grid length {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Grids do not match: [{r_min_a}, {r_max_a}] dr={dr_a} vs [{r_min_b}, {r_max_b}] dr={dr_b}")]
    GridMismatch {
        r_min_a: f64,
        r_max_a: f64,
        dr_a: f64,
        r_min_b: f64,
        r_max_b: f64,
        dr_b: f64,
    },

    #[error("Sample value at r = {r} is not finite")]
    NonFiniteSample { r: f64 },

    #[error("RDF value {value} at r = {r} is negative")]
    NegativeSample { r: f64, value: f64 },
}

/// A uniform radial grid over `[r_min, r_max]` with fixed spacing `dr`.
///
/// Every RDF and potential table in a run lives on one of these grids; the
/// optimizer requires all of them to coincide with the run grid, which is
/// fixed for the life of a run and recorded once in the run metadata.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RadialGrid {
    r_min: f64,
    dr: f64,
    n_points: usize,
}

impl RadialGrid {
    pub fn new(r_min: f64, r_max: f64, dr: f64) -> Result<Self, GridError> {
        if !dr.is_finite() || dr <= 0.0 {
            return Err(GridError::InvalidSpacing { dr });
        }
        if !r_min.is_finite() || !r_max.is_finite() || r_max <= r_min {
            return Err(GridError::InvalidRange { r_min, r_max });
        }
        let n_points = ((r_max - r_min) / dr).round() as usize + 1;
        if n_points < 2 {
            return Err(GridError::TooFewPoints { n_points });
        }
        Ok(Self { r_min, dr, n_points })
    }

    /// Grid over `[0, cutoff]` with `n_points` samples, so `dr = cutoff / (n_points - 1)`.
    pub fn from_cutoff(cutoff: f64, n_points: usize) -> Result<Self, GridError> {
        if n_points < 2 {
            return Err(GridError::TooFewPoints { n_points });
        }
        let dr = cutoff / (n_points - 1) as f64;
        if !dr.is_finite() || dr <= 0.0 {
            return Err(GridError::InvalidSpacing { dr });
        }
        Ok(Self {
            r_min: 0.0,
            dr,
            n_points,
        })
    }

    #[inline]
    pub fn r_min(&self) -> f64 {
        self.r_min
    }

    #[inline]
    pub fn r_max(&self) -> f64 {
        self.r_min + (self.n_points - 1) as f64 * self.dr
    }

    #[inline]
    pub fn dr(&self) -> f64 {
        self.dr
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.n_points
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.n_points == 0
    }

    #[inline]
    pub fn r(&self, index: usize) -> f64 {
        self.r_min + index as f64 * self.dr
    }

    pub fn r_values(&self) -> Vec<f64> {
        (0..self.n_points).map(|i| self.r(i)).collect()
    }

    /// Index of the first grid point at or above `r`, clamped into the grid.
    pub fn index_at_or_above(&self, r: f64) -> usize {
        if r <= self.r_min {
            return 0;
        }
        let idx = ((r - self.r_min) / self.dr).ceil() as usize;
        idx.min(self.n_points - 1)
    }

    /// Whether `other` covers the same extent with the same spacing.
    pub fn matches(&self, other: &RadialGrid) -> bool {
        let scale = self.dr.abs().max(1.0);
        self.n_points == other.n_points
            && (self.r_min - other.r_min).abs() <= GRID_MATCH_TOLERANCE * scale
            && (self.dr - other.dr).abs() <= GRID_MATCH_TOLERANCE * scale
    }

    pub(crate) fn mismatch_error(&self, other: &RadialGrid) -> GridError {
        GridError::GridMismatch {
            r_min_a: self.r_min(),
            r_max_a: self.r_max(),
            dr_a: self.dr(),
            r_min_b: other.r_min(),
            r_max_b: other.r_max(),
            dr_b: other.dr(),
        }
    }

    /// Locates `r` for linear interpolation: the lower bracketing index and
    /// the fractional offset towards the next point. Returns `None` outside
    /// the grid extent.
    pub(crate) fn bracket(&self, r: f64) -> Option<(usize, f64)> {
        if r < self.r_min || r > self.r_max() {
            return None;
        }
        let x = (r - self.r_min) / self.dr;
        let idx = (x.floor() as usize).min(self.n_points - 2);
        Some((idx, x - idx as f64))
    }
}
