//! # Core Models Module
//!
//! Data structures representing molecular trajectories.
//!
//! ## Key Components
//!
//! - [`topology`] - Atoms and residues of a fixed molecular topology, with
//!   protein/water/backbone classification derived from residue and atom names
//! - [`trajectory`] - Ordered frames of coordinates (and optional periodic box)
//!   over a topology, with slicing, striding and concatenation
//!
//! ## Usage
//!
//! ```ignore
//! use statesampler::core::models::{topology::Topology, trajectory::{Frame, Trajectory}};
//!
//! let mut topology = Topology::new();
//! topology.push_atom("CA", "ALA", 1, 1);
//! let trajectory = Trajectory::new(topology, vec![Frame::new(vec![Point3::origin()], None)])?;
//! ```

pub mod topology;
pub mod trajectory;
