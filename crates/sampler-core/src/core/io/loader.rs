use crate::core::io::gro::{GroError, GroFile};
use crate::core::io::traits::TrajectoryFile;
use crate::core::io::xtc::{XtcError, XtcFile};
use crate::core::models::topology::Topology;
use crate::core::models::trajectory::{Frame, Trajectory, TrajectoryShapeError};
use crate::core::topology::selection::{self, SelectionError};
use crate::core::utils::geometry::{kabsch, minimum_image_displacement};
use nalgebra::Point3;
use std::cmp::Ordering;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Atoms used to superpose frames when aligning a trajectory.
pub const ALIGNMENT_QUERY: &str = "protein and name CA";

#[derive(Debug, Error)]
pub enum TrajectoryError {
    #[error("No file matching '{pattern}' in directory {directory}")]
    NoMatch { directory: PathBuf, pattern: String },
    #[error("Unsupported trajectory format for file {0} (supported: .gro, .xtc)")]
    UnsupportedFormat(PathBuf),
    #[error("Failed to read {path}: {source}")]
    Gro {
        path: PathBuf,
        #[source]
        source: GroError,
    },
    #[error("Failed to read {path}: {source}")]
    Xtc {
        path: PathBuf,
        #[source]
        source: XtcError,
    },
    #[error("File {path} has {found} atoms but its topology has {expected}")]
    AtomCountMismatch {
        path: PathBuf,
        expected: usize,
        found: usize,
    },
    #[error("Invalid atom query: {0}")]
    Selection(#[from] SelectionError),
    #[error(transparent)]
    Shape(#[from] TrajectoryShapeError),
    #[error("I/O error while listing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Everything needed to load the trajectory of one walker.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRequest {
    pub directory: PathBuf,
    /// Wildcard pattern of trajectory files. `None` loads the topology file itself.
    pub trajectory_pattern: Option<String>,
    pub topology_pattern: String,
    pub stride: usize,
    /// Atom selection applied before any alignment.
    pub query: Option<String>,
    pub center_and_align: bool,
}

impl LoadRequest {
    pub fn new(
        directory: impl Into<PathBuf>,
        trajectory_pattern: Option<String>,
        topology_pattern: impl Into<String>,
    ) -> Self {
        Self {
            directory: directory.into(),
            trajectory_pattern,
            topology_pattern: topology_pattern.into(),
            stride: 1,
            query: None,
            center_and_align: true,
        }
    }

    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    pub fn with_query(mut self, query: Option<String>) -> Self {
        self.query = query;
        self
    }

    pub fn with_center_and_align(mut self, center_and_align: bool) -> Self {
        self.center_and_align = center_and_align;
        self
    }
}

/// Produces trajectories from storage.
pub trait TrajectorySource {
    fn load(&self, request: &LoadRequest) -> Result<Trajectory, TrajectoryError>;
}

/// Loads GROMACS trajectories from a directory.
///
/// The topology file must be a `.gro`; trajectory files may be `.gro` or `.xtc`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GroTrajectorySource;

impl TrajectorySource for GroTrajectorySource {
    fn load(&self, request: &LoadRequest) -> Result<Trajectory, TrajectoryError> {
        let topology_path = find_files(&request.directory, &request.topology_pattern)?
            .into_iter()
            .next()
            .ok_or_else(|| TrajectoryError::NoMatch {
                directory: request.directory.clone(),
                pattern: request.topology_pattern.clone(),
            })?;
        let reference = read_gro(&topology_path)?;

        let atom_indices = match &request.query {
            Some(query) => Some(selection::select(reference.topology(), query)?),
            None => None,
        };

        let Some(pattern) = &request.trajectory_pattern else {
            return Ok(match &atom_indices {
                Some(indices) => reference.atom_slice(indices)?,
                None => reference,
            });
        };

        let files = find_files(&request.directory, pattern)?;
        if files.is_empty() {
            return Err(TrajectoryError::NoMatch {
                directory: request.directory.clone(),
                pattern: pattern.clone(),
            });
        }
        debug!(
            "Loading {} files from directory {}",
            files.len(),
            request.directory.display()
        );

        let mut frames = Vec::new();
        for path in &files {
            frames.extend(read_trajectory_file(path, reference.topology())?);
        }

        let mut trajectory =
            Trajectory::new(reference.topology().clone(), frames)?.stride(request.stride)?;
        if let Some(indices) = &atom_indices {
            trajectory = trajectory.atom_slice(indices)?;
        }
        if request.center_and_align {
            make_molecules_whole(&mut trajectory);
            align_frames(&mut trajectory, ALIGNMENT_QUERY)?;
        }
        Ok(trajectory)
    }
}

fn read_gro(path: &Path) -> Result<Trajectory, TrajectoryError> {
    GroFile::read_from_path(path)
        .map(|(trajectory, _)| trajectory)
        .map_err(|source| TrajectoryError::Gro {
            path: path.to_path_buf(),
            source,
        })
}

/// Reads the frames of one trajectory file, checking them against `topology`.
fn read_trajectory_file(
    path: &Path,
    topology: &Topology,
) -> Result<Vec<Frame>, TrajectoryError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    let frames = match extension.as_deref() {
        Some("gro") => read_gro(path)?.frames().to_vec(),
        Some("xtc") => {
            XtcFile::read_frames(path).map_err(|source| TrajectoryError::Xtc {
                path: path.to_path_buf(),
                source,
            })?
        }
        _ => return Err(TrajectoryError::UnsupportedFormat(path.to_path_buf())),
    };
    let expected = topology.n_atoms();
    if let Some(frame) = frames.iter().find(|f| f.positions.len() != expected) {
        return Err(TrajectoryError::AtomCountMismatch {
            path: path.to_path_buf(),
            expected,
            found: frame.positions.len(),
        });
    }
    Ok(frames)
}

/// Lists files in `directory` matching `pattern`, naturally sorted.
///
/// Directory components of the pattern are taken literally; only the file name
/// component may contain `*` and `?` wildcards.
pub fn find_files(directory: &Path, pattern: &str) -> Result<Vec<PathBuf>, TrajectoryError> {
    let pattern_path = Path::new(pattern);
    let search_dir = match pattern_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => directory.join(parent),
        _ => directory.to_path_buf(),
    };
    let Some(name_pattern) = pattern_path.file_name().and_then(|n| n.to_str()) else {
        return Ok(Vec::new());
    };
    if !search_dir.is_dir() {
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(&search_dir).map_err(|source| TrajectoryError::Io {
        path: search_dir.clone(),
        source,
    })?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| TrajectoryError::Io {
            path: search_dir.clone(),
            source,
        })?;
        let file_name = entry.file_name();
        if let Some(name) = file_name.to_str()
            && entry.path().is_file()
            && wildcard_match(name_pattern, name)
        {
            names.push(name.to_string());
        }
    }
    names.sort_by(|a, b| natural_cmp(a, b));
    Ok(names.into_iter().map(|n| search_dir.join(n)).collect())
}

/// Shell-style matching of `*` (any run) and `?` (any single character).
pub fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == t[ti]) {
            pi += 1;
            ti += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ti));
            pi += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == '*')
}

#[derive(Debug, PartialEq, Eq)]
enum Chunk<'a> {
    Text(&'a str),
    Number(u128),
}

fn chunks(s: &str) -> Vec<Chunk<'_>> {
    let mut out = Vec::new();
    let mut start = 0;
    let bytes = s.as_bytes();
    while start < bytes.len() {
        let is_digit = bytes[start].is_ascii_digit();
        let mut end = start;
        while end < bytes.len() && bytes[end].is_ascii_digit() == is_digit {
            end += 1;
        }
        let part = &s[start..end];
        match part.parse::<u128>() {
            Ok(n) if is_digit => out.push(Chunk::Number(n)),
            _ => out.push(Chunk::Text(part)),
        }
        start = end;
    }
    out
}

/// Orders strings so that embedded numbers compare by value (`s2` < `s10`).
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (ca, cb) = (chunks(a), chunks(b));
    for (x, y) in ca.iter().zip(cb.iter()) {
        let ord = match (x, y) {
            (Chunk::Number(m), Chunk::Number(n)) => m.cmp(n),
            (Chunk::Text(m), Chunk::Text(n)) => m.cmp(n),
            (Chunk::Number(_), Chunk::Text(_)) => Ordering::Less,
            (Chunk::Text(_), Chunk::Number(_)) => Ordering::Greater,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    ca.len().cmp(&cb.len()).then_with(|| a.cmp(b))
}

/// Unwraps molecules split across periodic boundaries.
///
/// All protein residues are treated as one connected molecule and every other
/// residue as its own. Each atom is moved to the periodic image nearest to the
/// previous atom of its molecule.
pub fn make_molecules_whole(trajectory: &mut Trajectory) {
    let topology = trajectory.topology().clone();
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut protein = Vec::new();
    for residue in topology.residues() {
        if residue.is_protein() {
            protein.extend(residue.atoms.iter().copied());
        } else {
            groups.push(residue.atoms.clone());
        }
    }
    groups.push(protein);

    let mut repaired = 0usize;
    for frame in trajectory.frames_mut() {
        let Some(box_vectors) = frame.box_vectors else {
            continue;
        };
        for group in &groups {
            for pair in group.windows(2) {
                let (prev, cur) = (pair[0], pair[1]);
                let shift = minimum_image_displacement(
                    &frame.positions[prev],
                    &frame.positions[cur],
                    &box_vectors,
                );
                let whole = frame.positions[prev] + shift;
                if (whole - frame.positions[cur]).norm() > 1e-9 {
                    repaired += 1;
                    frame.positions[cur] = whole;
                }
            }
        }
    }
    if repaired > 0 {
        debug!("Made molecules whole across periodic boundaries ({repaired} atoms moved)");
    }
}

/// Superposes every frame on the first one using the atoms selected by `query`.
pub fn align_frames(trajectory: &mut Trajectory, query: &str) -> Result<(), TrajectoryError> {
    let atoms = selection::select(trajectory.topology(), query)?;
    if atoms.is_empty() {
        warn!("No atoms match '{query}', frames are left unaligned");
        return Ok(());
    }
    let Some(first) = trajectory.frames().first() else {
        return Ok(());
    };
    let target: Vec<_> = atoms.iter().map(|&i| first.positions[i]).collect();

    for frame in trajectory.frames_mut().iter_mut().skip(1) {
        let mobile: Vec<_> = atoms.iter().map(|&i| frame.positions[i]).collect();
        match kabsch(&mobile, &target) {
            Some(fit) => apply_in_place(frame, |p| fit.apply(p)),
            None => warn!("Superposition failed for a frame, it is left unaligned"),
        }
    }
    Ok(())
}

fn apply_in_place(frame: &mut Frame, transform: impl Fn(&Point3<f64>) -> Point3<f64>) {
    for p in frame.positions.iter_mut() {
        *p = transform(p);
    }
}
