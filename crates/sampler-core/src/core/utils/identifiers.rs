use phf::{Map, Set, phf_map, phf_set};

static BACKBONE_ATOM_NAMES: Set<&'static str> = phf_set! {
    "N", "H", "HN", "CA", "HA", "C", "O", "OXT", "H1", "H2", "H3", "NT",
    "HT1", "HT2", "HT3", "OT1", "OT2", "HC", "HOXT", "HA1", "HA2", "HA3", "1HA", "2HA",
};

static PROTEIN_RESIDUE_NAMES: Set<&'static str> = phf_set! {
    "ALA", "ARG", "ASN", "ASP", "CYS", "GLN", "GLU", "GLY", "HIS", "ILE",
    "LEU", "LYS", "MET", "PHE", "PRO", "SER", "THR", "TRP", "TYR", "VAL",
    "ACE", "NME", "NMA", "HID", "HIE", "HIP", "HSD", "HSE", "HSP", "CYX",
    "CYM", "ASH", "GLH", "LYN", "ARN", "MSE", "SEP", "TPO", "PTR",
};

static WATER_RESIDUE_NAMES: Set<&'static str> = phf_set! {
    "HOH", "SOL", "WAT", "TIP", "TIP3", "TIP4", "TIP5", "SPC", "T3P", "T4P", "T5P", "H2O",
};

// Monatomic ions whose atom name equals their residue name.
static ION_ELEMENTS: Map<&'static str, &'static str> = phf_map! {
    "NA" => "Na", "CL" => "Cl", "MG" => "Mg", "ZN" => "Zn", "CA" => "Ca",
    "K" => "K", "FE" => "Fe", "MN" => "Mn", "CU" => "Cu", "LI" => "Li",
};

pub fn is_backbone_atom(atom_name: &str) -> bool {
    BACKBONE_ATOM_NAMES.contains(atom_name.trim())
}

pub fn is_heavy_atom(atom_name: &str) -> bool {
    let first_char = atom_name
        .trim()
        .trim_start_matches(|c: char| c.is_ascii_digit())
        .chars()
        .next()
        .map(|c| c.to_ascii_uppercase());
    !matches!(first_char, Some('H') | Some('D'))
}

pub fn is_protein_residue(residue_name: &str) -> bool {
    PROTEIN_RESIDUE_NAMES.contains(residue_name.trim())
}

pub fn is_water_residue(residue_name: &str) -> bool {
    WATER_RESIDUE_NAMES.contains(residue_name.trim())
}

/// Guesses the chemical element symbol from an atom name and its residue.
///
/// Coordinate formats such as GRO carry no element column, so the element is
/// inferred from the first letter of the atom name. Monatomic ions are the
/// exception and are recognized by their residue name.
pub fn guess_element(atom_name: &str, residue_name: &str) -> String {
    let atom_name = atom_name.trim();
    let residue_name = residue_name.trim().to_ascii_uppercase();
    if residue_name == atom_name.to_ascii_uppercase() {
        if let Some(symbol) = ION_ELEMENTS.get(residue_name.as_str()) {
            return symbol.to_string();
        }
    }
    match atom_name
        .chars()
        .find(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_uppercase())
    {
        Some('D') => "H".to_string(),
        Some(c) => c.to_string(),
        None => String::new(),
    }
}
