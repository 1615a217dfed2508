use crate::core::potential::{PotentialTable, TableError, UpdatePolicy, UpdateStats};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An unordered pair of particle-type labels; the construction order of the
/// two types never matters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey {
    first: String,
    second: String,
}

impl PairKey {
    pub fn new(type_a: impl Into<String>, type_b: impl Into<String>) -> Self {
        let (a, b) = (type_a.into(), type_b.into());
        if a <= b {
            Self { first: a, second: b }
        } else {
            Self { first: b, second: a }
        }
    }

    #[inline]
    pub fn first(&self) -> &str {
        &self.first
    }

    #[inline]
    pub fn second(&self) -> &str {
        &self.second
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.first, self.second)
    }
}

/// A particle-type pair together with the one shared [`PotentialTable`] being
/// optimized for it, plus per-pair convergence bookkeeping.
#[derive(Debug, Clone)]
pub struct Pair {
    key: PairKey,
    potential: PotentialTable,
    update_history: Vec<UpdateStats>,
    consecutive_misses: usize,
    consecutive_rejections: usize,
}

impl Pair {
    pub fn new(key: PairKey, potential: PotentialTable) -> Self {
        Self {
            key,
            potential,
            update_history: Vec::new(),
            consecutive_misses: 0,
            consecutive_rejections: 0,
        }
    }

    #[inline]
    pub fn key(&self) -> &PairKey {
        &self.key
    }

    #[inline]
    pub fn potential(&self) -> &PotentialTable {
        &self.potential
    }

    #[inline]
    pub fn update_history(&self) -> &[UpdateStats] {
        &self.update_history
    }

    #[inline]
    pub fn consecutive_misses(&self) -> usize {
        self.consecutive_misses
    }

    #[inline]
    pub fn consecutive_rejections(&self) -> usize {
        self.consecutive_rejections
    }

    /// Applies an aggregated correction to the pair's table. On success the
    /// miss/rejection streaks reset and the update magnitude is recorded; a
    /// rejected update leaves the table untouched.
    pub fn apply_update(
        &mut self,
        delta: &[f64],
        policy: &UpdatePolicy,
    ) -> Result<UpdateStats, TableError> {
        match self.potential.apply_update(delta, policy) {
            Ok(_previous) => {
                let stats = UpdateStats::from_delta(delta);
                self.update_history.push(stats);
                self.consecutive_misses = 0;
                self.consecutive_rejections = 0;
                Ok(stats)
            }
            Err(err) => {
                self.consecutive_rejections += 1;
                Err(err)
            }
        }
    }

    /// Records an iteration in which no state contributed to this pair.
    pub fn record_miss(&mut self) {
        self.consecutive_misses += 1;
    }

    /// Consecutive iterations without a successfully applied update, whatever
    /// the cause (no contributors, or rejected corrections).
    pub fn iterations_without_update(&self) -> usize {
        self.consecutive_misses.max(self.consecutive_rejections)
    }
}
