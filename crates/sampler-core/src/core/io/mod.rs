//! Input/output for coordinate files and the sampling working directory.
//!
//! - [`gro`] reads and writes GROMACS `.gro` files through the [`traits::TrajectoryFile`] trait.
//! - [`xtc`] reads and writes compressed `.xtc` coordinates, paired with a `.gro` topology.
//! - [`loader`] resolves file patterns and assembles walker trajectories.
//! - [`fs`] handles directory creation with timestamped backups.

pub mod fs;
pub mod gro;
pub mod loader;
pub mod traits;
pub mod xtc;
