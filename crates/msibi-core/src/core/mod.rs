//! # Core Module
//!
//! This module provides the fundamental data structures and numerical
//! primitives for multistate iterative Boltzmann inversion, serving as the
//! stateless foundation of the library.
//!
//! ## Architecture
//!
//! The module is organized into specialized submodules that handle different
//! aspects of the structural-inversion problem:
//!
//! - **Radial Grid** ([`grid`]) - The uniform separation grid shared by every
//!   table and distribution in a run
//! - **Distributions** ([`rdf`]) - Radial distribution functions, resampling,
//!   and Boltzmann-inversion seeding
//! - **Potentials** ([`potential`]) - Tabulated pair potentials with head/tail
//!   correction, smoothing, and update application
//! - **Comparison** ([`compare`]) - The incremental Boltzmann-inversion
//!   correction and structural divergence metrics
//! - **Identities** ([`pair`], [`state`]) - Particle-type pairs that own the
//!   evolving potentials, and the thermodynamic states that constrain them
//! - **File I/O** ([`io`]) - CSV-backed table formats for potentials and RDFs

pub mod compare;
pub mod grid;
pub mod io;
pub mod pair;
pub mod potential;
pub mod rdf;
pub mod state;
