use super::config::ConfigError;
use super::polling::WaitError;
use super::reweight::ReweightError;
use super::scheduler::SchedulerError;
use crate::core::colvars::error::{CvError, CvIoError};
use crate::core::io::fs::FsError;
use crate::core::io::loader::TrajectoryError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Collective variable evaluation failed: {0}")]
    Cv(#[from] CvError),

    #[error("Failed to load collective variables: {0}")]
    CvIo(#[from] CvIoError),

    #[error("Failed to load trajectory of walker {walker}: {source}")]
    Trajectory {
        walker: usize,
        #[source]
        source: TrajectoryError,
    },

    #[error("Failed to load starting structure: {0}")]
    StartingStructure(#[source] TrajectoryError),

    #[error("Trajectory of walker {walker} has no frames")]
    EmptyTrajectory { walker: usize },

    #[error("Replica reweighting failed: {0}")]
    Reweight(#[from] ReweightError),

    #[error("Job submission failed: {0}")]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Fs(#[from] FsError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write convergence history: {0}")]
    History(#[from] csv::Error),

    #[error("Reweighting staged {staged} seed structures, expected {expected}")]
    Staging { expected: usize, staged: usize },

    #[error("Walkers did not finish within {elapsed:?}")]
    Timeout { elapsed: Duration },

    #[error("Waiting for walkers was cancelled")]
    Cancelled,
}

impl From<WaitError> for EngineError {
    fn from(error: WaitError) -> Self {
        match error {
            WaitError::Timeout(elapsed) => EngineError::Timeout { elapsed },
            WaitError::Cancelled => EngineError::Cancelled,
        }
    }
}
