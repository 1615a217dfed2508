use crate::core::pair::PairKey;
use crate::core::rdf::Rdf;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum StateError {
    #[error("State '{name}' has invalid temperature kT = {kt}: must be finite and positive")]
    InvalidTemperature { name: String, kt: f64 },

    #[error("State '{name}' has invalid weight {weight}: must be finite and non-negative")]
    InvalidWeight { name: String, weight: f64 },
}

/// A single thermodynamic condition participating in the optimization.
///
/// A state owns one target RDF per pair it constrains (it participates in
/// exactly those pairs), a weight controlling its influence in the
/// multi-state aggregation, and a current-RDF slot overwritten each
/// iteration. The simulation backend realizing the state is referenced by the
/// optimizer, never owned here.
#[derive(Debug, Clone)]
pub struct State {
    name: String,
    kt: f64,
    weight: f64,
    target_rdfs: HashMap<PairKey, Rdf>,
    current_rdfs: HashMap<PairKey, Rdf>,
    consecutive_failures: usize,
}

impl State {
    pub fn new(name: impl Into<String>, kt: f64, weight: f64) -> Result<Self, StateError> {
        let name = name.into();
        if !kt.is_finite() || kt <= 0.0 {
            return Err(StateError::InvalidTemperature { name, kt });
        }
        if !weight.is_finite() || weight < 0.0 {
            return Err(StateError::InvalidWeight { name, weight });
        }
        Ok(Self {
            name,
            kt,
            weight,
            target_rdfs: HashMap::new(),
            current_rdfs: HashMap::new(),
            consecutive_failures: 0,
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn kt(&self) -> f64 {
        self.kt
    }

    #[inline]
    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn add_target(&mut self, pair: PairKey, target: Rdf) {
        self.target_rdfs.insert(pair, target);
    }

    #[inline]
    pub fn target(&self, pair: &PairKey) -> Option<&Rdf> {
        self.target_rdfs.get(pair)
    }

    /// The pairs this state constrains.
    pub fn pairs(&self) -> impl Iterator<Item = &PairKey> {
        self.target_rdfs.keys()
    }

    #[inline]
    pub fn targets(&self) -> &HashMap<PairKey, Rdf> {
        &self.target_rdfs
    }

    pub fn record_measurement(&mut self, pair: PairKey, rdf: Rdf) {
        self.current_rdfs.insert(pair, rdf);
    }

    #[inline]
    pub fn measurement(&self, pair: &PairKey) -> Option<&Rdf> {
        self.current_rdfs.get(pair)
    }

    pub fn clear_measurements(&mut self) {
        self.current_rdfs.clear();
    }

    #[inline]
    pub fn consecutive_failures(&self) -> usize {
        self.consecutive_failures
    }

    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
    }

    pub fn reset_failures(&mut self) {
        self.consecutive_failures = 0;
    }
}
