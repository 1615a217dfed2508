//! # Workflows Module
//!
//! High-level entry points tying the `core` and `engine` layers together. A
//! workflow takes a fully described run setup (states, pairs, configuration,
//! simulation backend) and drives it to a terminal outcome, reporting progress
//! along the way.
//!
//! - **Optimization Workflow** ([`optimize`]) - A complete MS-IBI run from
//!   seed potentials to convergence, iteration cap, or diagnosed failure.

pub mod optimize;
