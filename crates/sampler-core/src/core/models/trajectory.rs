use super::topology::Topology;
use nalgebra::{Point3, Vector3};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TrajectoryShapeError {
    #[error("Frame {frame} has {found} atoms but the topology has {expected}")]
    AtomCountMismatch {
        frame: usize,
        expected: usize,
        found: usize,
    },
    #[error("Cannot join trajectories with different topologies ({left} vs {right} atoms)")]
    TopologyMismatch { left: usize, right: usize },
    #[error("Atom index {index} is out of range for a topology with {n_atoms} atoms")]
    AtomIndexOutOfRange { index: usize, n_atoms: usize },
    #[error("Stride must be at least 1")]
    ZeroStride,
}

/// Coordinates of every atom at one instant, in nanometers.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub positions: Vec<Point3<f64>>,
    /// Orthorhombic box edge lengths, if the frame is periodic.
    pub box_vectors: Option<Vector3<f64>>,
}

impl Frame {
    pub fn new(positions: Vec<Point3<f64>>, box_vectors: Option<Vector3<f64>>) -> Self {
        Self {
            positions,
            box_vectors,
        }
    }
}

/// An ordered sequence of frames over a fixed topology.
#[derive(Debug, Clone, PartialEq)]
pub struct Trajectory {
    topology: Topology,
    frames: Vec<Frame>,
}

impl Trajectory {
    pub fn new(topology: Topology, frames: Vec<Frame>) -> Result<Self, TrajectoryShapeError> {
        let expected = topology.n_atoms();
        if let Some((frame, f)) = frames
            .iter()
            .enumerate()
            .find(|(_, f)| f.positions.len() != expected)
        {
            return Err(TrajectoryShapeError::AtomCountMismatch {
                frame,
                expected,
                found: f.positions.len(),
            });
        }
        Ok(Self { topology, frames })
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn frames_mut(&mut self) -> &mut [Frame] {
        &mut self.frames
    }

    pub fn n_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn n_atoms(&self) -> usize {
        self.topology.n_atoms()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn last_frame(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// Keeps only the given atoms, in the given order, for every frame.
    pub fn atom_slice(&self, indices: &[usize]) -> Result<Trajectory, TrajectoryShapeError> {
        let n_atoms = self.n_atoms();
        if let Some(&index) = indices.iter().find(|&&i| i >= n_atoms) {
            return Err(TrajectoryShapeError::AtomIndexOutOfRange { index, n_atoms });
        }
        let frames = self
            .frames
            .iter()
            .map(|f| Frame {
                positions: indices.iter().map(|&i| f.positions[i]).collect(),
                box_vectors: f.box_vectors,
            })
            .collect();
        Ok(Trajectory {
            topology: self.topology.subset(indices),
            frames,
        })
    }

    /// Keeps every `stride`-th frame, starting with the first.
    pub fn stride(self, stride: usize) -> Result<Trajectory, TrajectoryShapeError> {
        if stride == 0 {
            return Err(TrajectoryShapeError::ZeroStride);
        }
        if stride == 1 {
            return Ok(self);
        }
        let frames = self.frames.into_iter().step_by(stride).collect();
        Ok(Trajectory {
            topology: self.topology,
            frames,
        })
    }

    /// Appends the frames of `other`, which must share this topology's atom count.
    pub fn join(mut self, other: Trajectory) -> Result<Trajectory, TrajectoryShapeError> {
        if self.n_atoms() != other.n_atoms() {
            return Err(TrajectoryShapeError::TopologyMismatch {
                left: self.n_atoms(),
                right: other.n_atoms(),
            });
        }
        self.frames.extend(other.frames);
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_atom_topology() -> Topology {
        let mut top = Topology::new();
        top.push_atom("CA", "ALA", 1, 1);
        top.push_atom("CA", "GLY", 2, 2);
        top
    }

    fn frame(x: f64) -> Frame {
        Frame::new(
            vec![Point3::new(x, 0.0, 0.0), Point3::new(x + 1.0, 0.0, 0.0)],
            None,
        )
    }

    #[test]
    fn new_rejects_frames_with_wrong_atom_count() {
        let bad = Frame::new(vec![Point3::origin()], None);
        let result = Trajectory::new(two_atom_topology(), vec![frame(0.0), bad]);
        assert_eq!(
            result.unwrap_err(),
            TrajectoryShapeError::AtomCountMismatch {
                frame: 1,
                expected: 2,
                found: 1
            }
        );
    }

    #[test]
    fn atom_slice_selects_positions_and_topology() {
        let traj = Trajectory::new(two_atom_topology(), vec![frame(0.0), frame(2.0)]).unwrap();
        let sliced = traj.atom_slice(&[1]).unwrap();
        assert_eq!(sliced.n_atoms(), 1);
        assert_eq!(sliced.n_frames(), 2);
        assert_eq!(sliced.frames()[1].positions[0].x, 3.0);
        assert!(matches!(
            traj.atom_slice(&[2]),
            Err(TrajectoryShapeError::AtomIndexOutOfRange { index: 2, .. })
        ));
    }

    #[test]
    fn stride_and_join_manage_frames() {
        let traj = Trajectory::new(
            two_atom_topology(),
            (0..5).map(|i| frame(i as f64)).collect(),
        )
        .unwrap();
        let strided = traj.clone().stride(2).unwrap();
        assert_eq!(strided.n_frames(), 3);
        assert_eq!(strided.last_frame().unwrap().positions[0].x, 4.0);
        assert!(traj.clone().stride(0).is_err());

        let joined = strided.join(traj).unwrap();
        assert_eq!(joined.n_frames(), 8);
    }
}
