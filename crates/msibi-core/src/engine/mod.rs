//! # Engine Module
//!
//! This module implements the stateful optimization machinery for multistate
//! iterative Boltzmann inversion: the iteration state machine that dispatches
//! simulations, aggregates per-state corrections into per-pair potential
//! updates, and decides when a run has converged, stalled, or failed.
//!
//! ## Architecture
//!
//! The module is organized into specialized submodules that handle different
//! aspects of the optimization process:
//!
//! - **Configuration** ([`config`]) - Grid, update-policy, and convergence
//!   parameters with startup validation
//! - **Backend Seam** ([`backend`]) - The narrow traits through which external
//!   simulation engines and RDF extractors are consumed
//! - **Driver** ([`optimizer`]) - The per-iteration state machine
//! - **History** ([`record`]) - Append-only iteration records, terminal run
//!   outcomes, and persisted per-iteration artifacts
//! - **Progress Monitoring** ([`progress`]) - Progress reporting and user
//!   feedback mechanisms
//! - **Error Handling** ([`error`]) - Engine-specific error types and error
//!   propagation

pub mod backend;
pub mod config;
pub mod error;
pub mod optimizer;
pub mod progress;
pub mod record;
