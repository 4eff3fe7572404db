use crate::core::io::fs::FsError;
use crate::core::io::gro::GroError;
use crate::core::models::trajectory::TrajectoryShapeError;
use crate::core::topology::selection::SelectionError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CvError {
    #[error("Collective variable '{id}' has no evaluation function")]
    MissingGenerator { id: String },

    #[error("No protein residue with sequence number {0}")]
    ResidueNotFound(isize),

    #[error("Contact needs two distinct residues, got {0} twice")]
    SameResidue(isize),

    #[error("Atom set is empty: {0}")]
    EmptyAtomSet(String),

    #[error("Reference structure has no frames")]
    EmptyReference,

    #[error("Cannot normalize on trajectories without frames")]
    NoFrames,

    #[error("At least one collective variable is required")]
    NoCvs,

    #[error("Invalid atom selection: {0}")]
    Selection(#[from] SelectionError),

    #[error("Shape mismatch: expected {expected}, found {found}")]
    ShapeMismatch { expected: String, found: String },

    #[error("Superposition failed on frame {frame}")]
    Superposition { frame: usize },

    #[error(transparent)]
    Trajectory(#[from] TrajectoryShapeError),
}

#[derive(Debug, Error)]
pub enum CvIoError {
    #[error("Failed to access CV definition file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid CV definition JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid CV definition at index {index}: {message}")]
    InvalidDefinition { index: usize, message: String },

    #[error("Failed to load reference structure {path}: {source}")]
    Reference {
        path: PathBuf,
        #[source]
        source: GroError,
    },

    #[error(transparent)]
    Fs(#[from] FsError),
}
