//! # Workflows Module
//!
//! High-level entry points that drive a complete swarm sampling run.
//!
//! ## Overview
//!
//! A workflow loads the starting structure, walks the iteration directories in
//! order and hands each one to an
//! [`IterationController`](crate::engine::controller::IterationController).
//! It reports progress through the [`ProgressReporter`](crate::engine::progress::ProgressReporter)
//! and writes the convergence history of the swarm centers once it stops.
//!
//! - **Sampling Workflow** ([`sample`]) - Runs iterations in `server` mode or
//!   re-evaluates finished ones in `convergence` mode.

pub mod sample;
