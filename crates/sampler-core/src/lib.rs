//! # statesampler Core Library
//!
//! An adaptive swarm sampling controller for molecular dynamics. Each iteration
//! runs a swarm of short walker simulations, projects their trajectories onto
//! collective variables (CVs), and reseeds the next iteration from the walkers
//! whose end points best serve the chosen exploration policy.
//!
//! ## Architectural Philosophy
//!
//! The library keeps the same three layers throughout:
//!
//! - **[`core`]: The Foundation.** Stateless data models (`Topology`, `Trajectory`),
//!   atom selections, GRO I/O, trajectory loading and the collective variables
//!   together with their JSON definitions.
//!
//! - **[`engine`]: The Logic Core.** The stateful part of an iteration: job
//!   submission through a [`Scheduler`](engine::scheduler::Scheduler), completion
//!   polling, swarm center evaluation and replica reweighting.
//!
//! - **[`workflows`]: The Public API.** Ties `engine` and `core` together into a
//!   complete multi-iteration sampling run.

pub mod core;
pub mod engine;
pub mod workflows;
