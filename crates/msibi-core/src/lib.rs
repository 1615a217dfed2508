//! # MS-IBI Core Library
//!
//! A library for deriving coarse-grained pairwise interaction potentials with
//! multistate iterative Boltzmann inversion (MS-IBI): one shared tabulated
//! potential per particle-type pair is refined until simulations at every
//! thermodynamic state reproduce that state's target radial distribution
//! function.
//!
//! ## Architectural Philosophy
//!
//! The library is designed with a strict three-layer architecture to ensure a
//! clear separation of concerns, making it modular, testable, and extensible.
//!
//! - **[`core`]: The Foundation.** Contains stateless data models (`RadialGrid`,
//!   `Rdf`, `PotentialTable`), the pure Boltzmann-inversion comparison math
//!   (`compare`), and tabular file I/O.
//!
//! - **[`engine`]: The Logic Core.** This stateful layer orchestrates the
//!   optimization process: configuration and validation, the simulation-backend
//!   seam, the per-iteration state machine, progress reporting, and the
//!   append-only iteration history.
//!
//! - **[`workflows`]: The Public API.** The highest-level, user-facing layer.
//!   It ties the `engine` and `core` together to run a complete optimization
//!   from seed potentials to a terminal outcome.

pub mod core;
pub mod engine;
pub mod workflows;
