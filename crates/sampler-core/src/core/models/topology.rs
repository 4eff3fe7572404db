use crate::core::utils::identifiers::{
    guess_element, is_backbone_atom, is_heavy_atom, is_protein_residue, is_water_residue,
};
use std::fmt;

/// A single atom of a topology.
#[derive(Debug, Clone, PartialEq)]
pub struct AtomInfo {
    /// Zero-based position of the atom in the topology.
    pub index: usize,
    /// The atom name as written in the structure file (e.g., "CA").
    pub name: String,
    /// Element symbol, inferred from the name when the file carries none.
    pub element: String,
    /// Zero-based index of the owning residue.
    pub residue_index: usize,
    /// Serial number as written in the structure file.
    pub serial: usize,
}

/// A residue, identified by its sequence number (`resSeq`) and name.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidueInfo {
    pub index: usize,
    pub name: String,
    pub seq: isize,
    pub atoms: Vec<usize>,
}

impl ResidueInfo {
    pub fn is_protein(&self) -> bool {
        is_protein_residue(&self.name)
    }

    pub fn is_water(&self) -> bool {
        is_water_residue(&self.name)
    }
}

/// Fixed atom topology shared by every frame of a trajectory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Topology {
    atoms: Vec<AtomInfo>,
    residues: Vec<ResidueInfo>,
}

impl Topology {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an atom, opening a new residue whenever the residue number or
    /// name changes from the previously added atom.
    pub fn push_atom(&mut self, name: &str, residue_name: &str, residue_seq: isize, serial: usize) {
        let starts_new_residue = self
            .residues
            .last()
            .is_none_or(|r| r.seq != residue_seq || r.name != residue_name);
        if starts_new_residue {
            let index = self.residues.len();
            self.residues.push(ResidueInfo {
                index,
                name: residue_name.to_string(),
                seq: residue_seq,
                atoms: Vec::new(),
            });
        }
        let residue_index = self.residues.len() - 1;
        let index = self.atoms.len();
        self.atoms.push(AtomInfo {
            index,
            name: name.to_string(),
            element: guess_element(name, residue_name),
            residue_index,
            serial,
        });
        self.residues[residue_index].atoms.push(index);
    }

    pub fn n_atoms(&self) -> usize {
        self.atoms.len()
    }

    pub fn n_residues(&self) -> usize {
        self.residues.len()
    }

    pub fn atoms(&self) -> &[AtomInfo] {
        &self.atoms
    }

    pub fn atom(&self, index: usize) -> Option<&AtomInfo> {
        self.atoms.get(index)
    }

    pub fn residues(&self) -> &[ResidueInfo] {
        &self.residues
    }

    pub fn residue(&self, index: usize) -> Option<&ResidueInfo> {
        self.residues.get(index)
    }

    pub fn residue_of(&self, atom: &AtomInfo) -> &ResidueInfo {
        &self.residues[atom.residue_index]
    }

    pub fn is_backbone(&self, atom: &AtomInfo) -> bool {
        self.residue_of(atom).is_protein() && is_backbone_atom(&atom.name)
    }

    pub fn is_heavy(&self, atom: &AtomInfo) -> bool {
        atom.element != "H" && is_heavy_atom(&atom.name)
    }

    /// Label used to match atoms between topologies, e.g. `ALA12-CA`.
    pub fn atom_label(&self, atom: &AtomInfo) -> String {
        let residue = self.residue_of(atom);
        format!("{}{}-{}", residue.name, residue.seq, atom.name)
    }

    /// Builds a new topology containing only the given atoms, in the given order.
    pub fn subset(&self, indices: &[usize]) -> Topology {
        let mut topology = Topology::new();
        for &i in indices {
            let atom = &self.atoms[i];
            let residue = self.residue_of(atom);
            topology.push_atom(&atom.name, &residue.name, residue.seq, atom.serial);
        }
        topology
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "<Topology with {} residues and {} atoms>",
            self.residues.len(),
            self.atoms.len()
        )
    }
}
