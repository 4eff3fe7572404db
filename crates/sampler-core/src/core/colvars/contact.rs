use super::cv::CvGenerator;
use super::error::CvError;
use crate::core::models::topology::{AtomInfo, Topology};
use crate::core::models::trajectory::Trajectory;
use crate::core::utils::geometry::distance;
use crate::core::utils::identifiers::is_backbone_atom;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which atom pairs of two residues define their contact distance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContactScheme {
    /// Alpha carbons only.
    Ca,
    /// Closest pair of any atoms.
    Closest,
    /// Closest pair of non-hydrogen atoms.
    #[default]
    ClosestHeavy,
    /// Closest pair of side-chain atoms.
    Sidechain,
    /// Closest pair of non-hydrogen side-chain atoms.
    SidechainHeavy,
}

impl ContactScheme {
    fn includes(self, topology: &Topology, atom: &AtomInfo) -> bool {
        match self {
            ContactScheme::Ca => atom.name == "CA",
            ContactScheme::Closest => true,
            ContactScheme::ClosestHeavy => topology.is_heavy(atom),
            ContactScheme::Sidechain => !is_backbone_atom(&atom.name),
            ContactScheme::SidechainHeavy => {
                !is_backbone_atom(&atom.name) && topology.is_heavy(atom)
            }
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            ContactScheme::Ca => "ca",
            ContactScheme::Closest => "closest",
            ContactScheme::ClosestHeavy => "closest-heavy",
            ContactScheme::Sidechain => "sidechain",
            ContactScheme::SidechainHeavy => "sidechain-heavy",
        }
    }
}

impl fmt::Display for ContactScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContactScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ca" => Ok(ContactScheme::Ca),
            "closest" => Ok(ContactScheme::Closest),
            "closest-heavy" => Ok(ContactScheme::ClosestHeavy),
            "sidechain" => Ok(ContactScheme::Sidechain),
            "sidechain-heavy" => Ok(ContactScheme::SidechainHeavy),
            other => Err(format!("Unknown contact scheme '{other}'")),
        }
    }
}

/// Minimum distance between two protein residues, identified by `resSeq`.
#[derive(Debug, Clone, PartialEq)]
pub struct ContactCv {
    pub res1: isize,
    pub res2: isize,
    pub scheme: ContactScheme,
    /// Use the minimum-image convention when frames carry a box.
    pub periodic: bool,
}

impl ContactCv {
    pub fn new(res1: isize, res2: isize) -> Self {
        Self {
            res1,
            res2,
            scheme: ContactScheme::default(),
            periodic: true,
        }
    }

    pub fn with_scheme(mut self, scheme: ContactScheme) -> Self {
        self.scheme = scheme;
        self
    }

    pub fn with_periodic(mut self, periodic: bool) -> Self {
        self.periodic = periodic;
        self
    }

    fn scheme_atoms(&self, topology: &Topology, seq: isize) -> Result<Vec<usize>, CvError> {
        let residue = topology
            .residues()
            .iter()
            .find(|r| r.is_protein() && r.seq == seq)
            .ok_or(CvError::ResidueNotFound(seq))?;
        let atoms: Vec<usize> = residue
            .atoms
            .iter()
            .copied()
            .filter(|&i| self.scheme.includes(topology, &topology.atoms()[i]))
            .collect();
        if atoms.is_empty() {
            return Err(CvError::EmptyAtomSet(format!(
                "residue {}{} has no atoms for scheme '{}'",
                residue.name, residue.seq, self.scheme
            )));
        }
        Ok(atoms)
    }
}

impl CvGenerator for ContactCv {
    fn generate(&self, trajectory: &Trajectory) -> Result<DMatrix<f64>, CvError> {
        if self.res1 == self.res2 {
            return Err(CvError::SameResidue(self.res1));
        }
        let topology = trajectory.topology();
        let group1 = self.scheme_atoms(topology, self.res1)?;
        let group2 = self.scheme_atoms(topology, self.res2)?;

        let values = trajectory.frames().iter().map(|frame| {
            let box_vectors = if self.periodic {
                frame.box_vectors.as_ref()
            } else {
                None
            };
            group1
                .iter()
                .flat_map(|&i| group2.iter().map(move |&j| (i, j)))
                .map(|(i, j)| distance(&frame.positions[i], &frame.positions[j], box_vectors))
                .fold(f64::INFINITY, f64::min)
        });
        Ok(DMatrix::from_iterator(trajectory.n_frames(), 1, values))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::colvars::cv::CvKind;
    use crate::core::models::trajectory::Frame;
    use nalgebra::{Point3, Vector3};

    fn two_residue_trajectory(box_vectors: Option<Vector3<f64>>) -> Trajectory {
        let mut top = Topology::new();
        top.push_atom("CA", "ALA", 10, 1);
        top.push_atom("CB", "ALA", 10, 2);
        top.push_atom("HB1", "ALA", 10, 3);
        top.push_atom("CA", "LEU", 20, 4);
        top.push_atom("CB", "LEU", 20, 5);
        top.push_atom("OW", "SOL", 30, 6);
        let positions = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.3, 0.0, 0.0),
            Point3::new(0.9, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(1.5, 0.0, 0.0),
            Point3::new(0.5, 0.5, 0.5),
        ];
        Trajectory::new(top, vec![Frame::new(positions, box_vectors)]).unwrap()
    }

    fn contact(scheme: ContactScheme) -> f64 {
        let cv = ContactCv::new(10, 20).with_scheme(scheme);
        cv.generate(&two_residue_trajectory(None)).unwrap()[(0, 0)]
    }

    #[test]
    fn schemes_choose_different_atom_pairs() {
        assert!((contact(ContactScheme::Ca) - 2.0).abs() < 1e-12);
        assert!((contact(ContactScheme::Closest) - 0.6).abs() < 1e-12);
        assert!((contact(ContactScheme::ClosestHeavy) - 1.2).abs() < 1e-12);
        assert!((contact(ContactScheme::Sidechain) - 0.6).abs() < 1e-12);
        assert!((contact(ContactScheme::SidechainHeavy) - 1.2).abs() < 1e-12);
    }

    #[test]
    fn periodic_contact_uses_minimum_image() {
        let traj = two_residue_trajectory(Some(Vector3::new(2.5, 2.5, 2.5)));
        let periodic = ContactCv::new(10, 20).with_scheme(ContactScheme::Ca);
        assert!((periodic.generate(&traj).unwrap()[(0, 0)] - 0.5).abs() < 1e-12);

        let plain = periodic.clone().with_periodic(false);
        assert!((plain.generate(&traj).unwrap()[(0, 0)] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn unknown_or_non_protein_residue_is_a_value_error() {
        let traj = two_residue_trajectory(None);
        assert!(matches!(
            ContactCv::new(10, 99).generate(&traj),
            Err(CvError::ResidueNotFound(99))
        ));
        assert!(matches!(
            ContactCv::new(10, 30).generate(&traj),
            Err(CvError::ResidueNotFound(30))
        ));
    }

    #[test]
    fn same_residue_on_both_sides_is_rejected() {
        let traj = two_residue_trajectory(None);
        assert!(matches!(
            ContactCv::new(10, 10).generate(&traj),
            Err(CvError::SameResidue(10))
        ));
        let inverse = CvKind::InverseContact(ContactCv::new(20, 20));
        assert!(matches!(
            inverse.generate(&traj),
            Err(CvError::SameResidue(20))
        ));
    }

    #[test]
    fn scheme_parses_from_kebab_case() {
        assert_eq!(
            "sidechain-heavy".parse::<ContactScheme>().unwrap(),
            ContactScheme::SidechainHeavy
        );
        assert_eq!(ContactScheme::ClosestHeavy.to_string(), "closest-heavy");
        assert!("nearest".parse::<ContactScheme>().is_err());
    }
}
