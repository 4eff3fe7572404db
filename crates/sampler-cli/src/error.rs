use statesampler::core::colvars::error::{CvError, CvIoError};
use statesampler::core::io::loader::TrajectoryError;
use statesampler::engine::error::EngineError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Sampler(#[from] EngineError),

    #[error(transparent)]
    Cvs(#[from] CvIoError),

    #[error("Collective variable evaluation failed: {0}")]
    Cv(#[from] CvError),

    #[error(transparent)]
    Trajectory(#[from] TrajectoryError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse file '{path}': {source}", path = path.display())]
    FileParsing {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
