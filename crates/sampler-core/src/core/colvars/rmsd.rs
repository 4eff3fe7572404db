use super::cv::CvGenerator;
use super::error::CvError;
use crate::core::models::topology::Topology;
use crate::core::models::trajectory::Trajectory;
use crate::core::topology::selection::select;
use crate::core::utils::geometry::superposed_rmsd;
use nalgebra::{DMatrix, Point3};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;

pub const DEFAULT_RMSD_QUERY: &str = "protein and element != 'H'";

/// Deviation from a reference structure after optimal superposition.
///
/// Atoms are paired by their `RESNAMEresSeq-NAME` label over the atoms that
/// `query` selects in both topologies.
#[derive(Debug, Clone, PartialEq)]
pub struct RmsdCv {
    pub query: String,
    pub reference: Arc<Trajectory>,
    /// Location of the reference as written in the CV definition file.
    pub reference_path: Option<PathBuf>,
    pub warn_missing_atoms: bool,
}

impl RmsdCv {
    pub fn new(reference: Trajectory) -> Self {
        Self {
            query: DEFAULT_RMSD_QUERY.to_string(),
            reference: Arc::new(reference),
            reference_path: None,
            warn_missing_atoms: true,
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = query.into();
        self
    }

    pub fn with_reference_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.reference_path = Some(path.into());
        self
    }

    pub fn with_warn_missing_atoms(mut self, warn_missing_atoms: bool) -> Self {
        self.warn_missing_atoms = warn_missing_atoms;
        self
    }

    /// Returns the indices of the name-matched atoms in `topology` and in the
    /// reference topology, in topology order.
    pub fn select_atoms_in_common(
        &self,
        topology: &Topology,
    ) -> Result<(Vec<usize>, Vec<usize>), CvError> {
        let reference_topology = self.reference.topology();
        let atoms = labelled(topology, &select(topology, &self.query)?);
        let ref_atoms = labelled(reference_topology, &select(reference_topology, &self.query)?);

        let (ref_atoms, missing) = filter_atoms(ref_atoms, &atoms);
        if self.warn_missing_atoms && !missing.is_empty() {
            warn!(
                "{} atoms in reference not found in topology. They will be ignored. {:?}",
                missing.len(),
                missing
            );
        }
        let (atoms, missing) = filter_atoms(atoms, &ref_atoms);
        if self.warn_missing_atoms && !missing.is_empty() {
            warn!(
                "{} atoms in topology not found in reference. They will be ignored. {:?}",
                missing.len(),
                missing
            );
        }
        if self.warn_missing_atoms {
            for (which, list) in [("topology", &atoms), ("reference", &ref_atoms)] {
                let duplicates = find_duplicates(list);
                if !duplicates.is_empty() {
                    warn!(
                        "{} duplicates found in {}: {:?}",
                        duplicates.len(),
                        which,
                        duplicates
                    );
                }
            }
            if atoms.len() != ref_atoms.len() {
                warn!(
                    "Number of matched atoms differ: {} vs {}",
                    atoms.len(),
                    ref_atoms.len()
                );
            }
        }
        Ok((
            atoms.into_iter().map(|(i, _)| i).collect(),
            ref_atoms.into_iter().map(|(i, _)| i).collect(),
        ))
    }
}

fn labelled(topology: &Topology, indices: &[usize]) -> Vec<(usize, String)> {
    indices
        .iter()
        .map(|&i| (i, topology.atom_label(&topology.atoms()[i])))
        .collect()
}

/// Splits `atoms` into those whose label appears in `others` and those missing.
fn filter_atoms(
    atoms: Vec<(usize, String)>,
    others: &[(usize, String)],
) -> (Vec<(usize, String)>, Vec<String>) {
    let known: HashSet<&str> = others.iter().map(|(_, label)| label.as_str()).collect();
    let mut matching = Vec::with_capacity(atoms.len());
    let mut missing = Vec::new();
    for (index, label) in atoms {
        if known.contains(label.as_str()) {
            matching.push((index, label));
        } else {
            missing.push(label);
        }
    }
    (matching, missing)
}

fn find_duplicates(atoms: &[(usize, String)]) -> Vec<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for (_, label) in atoms {
        *counts.entry(label.as_str()).or_default() += 1;
    }
    atoms
        .iter()
        .filter(|(_, label)| counts[label.as_str()] > 1)
        .map(|(_, label)| label.clone())
        .collect()
}

impl CvGenerator for RmsdCv {
    fn generate(&self, trajectory: &Trajectory) -> Result<DMatrix<f64>, CvError> {
        let (atoms, ref_atoms) = self.select_atoms_in_common(trajectory.topology())?;
        if atoms.is_empty() {
            return Err(CvError::EmptyAtomSet(format!(
                "no atoms matching '{}' shared with the reference",
                self.query
            )));
        }
        if atoms.len() != ref_atoms.len() {
            return Err(CvError::ShapeMismatch {
                expected: format!("{} reference atoms", ref_atoms.len()),
                found: format!("{} atoms", atoms.len()),
            });
        }
        let reference_frame = self
            .reference
            .frames()
            .first()
            .ok_or(CvError::EmptyReference)?;
        let target: Vec<Point3<f64>> = ref_atoms
            .iter()
            .map(|&i| reference_frame.positions[i])
            .collect();

        let mut values = Vec::with_capacity(trajectory.n_frames());
        for (frame_index, frame) in trajectory.frames().iter().enumerate() {
            let mobile: Vec<Point3<f64>> = atoms.iter().map(|&i| frame.positions[i]).collect();
            let rmsd = superposed_rmsd(&mobile, &target).ok_or(CvError::Superposition {
                frame: frame_index,
            })?;
            values.push(rmsd);
        }
        Ok(DMatrix::from_vec(values.len(), 1, values))
    }
}
