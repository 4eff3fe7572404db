//! Collective variables: scalar projections of a trajectory used as the
//! reduced coordinates of the sampling.
//!
//! A [`CollectiveVariable`](cv::CollectiveVariable) pairs an identity with one of
//! the evaluation functions in [`cv::CvKind`] and an immutable
//! [`Normalization`](cv::Normalization) record. The [`evaluator`] functions apply a
//! CV set to a trajectory, and [`io`] reads and writes JSON definition files.

pub mod contact;
pub mod cv;
pub mod error;
pub mod evaluator;
pub mod io;
pub mod rmsd;
