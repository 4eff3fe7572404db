use nalgebra::DVector;
use std::fmt;

/// Lifecycle of one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IterationState {
    #[default]
    Pending,
    Submitted,
    WaitingForCompletion,
    Evaluating,
    Redistributing,
    Done,
}

impl fmt::Display for IterationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IterationState::Pending => "pending",
            IterationState::Submitted => "submitted",
            IterationState::WaitingForCompletion => "waiting for completion",
            IterationState::Evaluating => "evaluating",
            IterationState::Redistributing => "redistributing",
            IterationState::Done => "done",
        };
        f.write_str(name)
    }
}

/// Swarm center and per-walker final-frame distances, in normalized CV space.
#[derive(Debug, Clone, PartialEq)]
pub struct SwarmEvaluation {
    pub center: DVector<f64>,
    pub distances: Vec<f64>,
    /// Total number of frames over all walkers.
    pub n_frames: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IterationOutcome {
    pub iteration: usize,
    pub center: DVector<f64>,
    pub distances: Vec<f64>,
    pub replicas: Vec<usize>,
}
