//! # Core Module
//!
//! Stateless building blocks of the sampler.
//!
//! - **Molecular Representation** ([`models`]) - Topologies and multi-frame trajectories
//! - **File I/O** ([`io`]) - GRO files, trajectory loading and working-directory bookkeeping
//! - **Atom Selection** ([`topology`]) - Query language for picking atoms by name, residue or class
//! - **Collective Variables** ([`colvars`]) - CV definitions, evaluation and normalization
//! - **Utilities** ([`utils`]) - Geometry and residue/atom name tables

pub mod colvars;
pub mod io;
pub mod models;
pub mod topology;
pub mod utils;
