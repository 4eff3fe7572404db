//! # Engine Module
//!
//! Stateful orchestration of one sampling iteration.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Iteration parameters, file name templates and load settings
//! - **Reweighting** ([`reweight`]) - Exploration policies and the replica budget partition
//! - **Scheduling** ([`scheduler`]) - Submission of walker job arrays
//! - **Waiting** ([`polling`]) - Poll policy with timeout, backoff and cancellation
//! - **Control Loop** ([`controller`]) - Submit, wait, evaluate and stage the next iteration
//! - **State Tracking** ([`state`]) - Iteration lifecycle and outcomes
//! - **Progress Monitoring** ([`progress`]) - Callbacks for user-facing progress display
//! - **Error Handling** ([`error`]) - Engine-level error aggregation

pub mod config;
pub mod controller;
pub mod error;
pub mod polling;
pub mod progress;
pub mod reweight;
pub mod scheduler;
pub mod state;
