use crate::core::io::traits::TrajectoryFile;
use crate::core::models::topology::Topology;
use crate::core::models::trajectory::{Frame, Trajectory, TrajectoryShapeError};
use nalgebra::{Point3, Vector3};
use std::io::{self, BufRead, Write};
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroMetadata {
    /// Title line of every frame, in order.
    pub titles: Vec<String>,
}

#[derive(Debug, Error)]
pub enum GroError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {kind}")]
    Parse { line: usize, kind: GroParseErrorKind },
    #[error("Inconsistent data: {0}")]
    Inconsistency(String),
    #[error("File contains no frames")]
    Empty,
    #[error(transparent)]
    Shape(#[from] TrajectoryShapeError),
}

#[derive(Debug, Error)]
pub enum GroParseErrorKind {
    #[error("Invalid atom count (value: '{0}')")]
    InvalidAtomCount(String),
    #[error("Invalid integer format in columns {columns} (value: '{value}')")]
    InvalidInt { columns: String, value: String },
    #[error("Invalid float format in columns {columns} (value: '{value}')")]
    InvalidFloat { columns: String, value: String },
    #[error("Line is too short for an atom record (must be at least 44 chars)")]
    LineTooShort,
    #[error("Unexpected end of file, expected {0}")]
    UnexpectedEof(&'static str),
    #[error("Box line must contain 3 or 9 values")]
    InvalidBox,
}

fn slice_and_trim(line: &str, start: usize, end: usize) -> &str {
    line.get(start..end).unwrap_or("").trim()
}

fn parse_float(line: &str, start: usize, end: usize, line_num: usize) -> Result<f64, GroError> {
    let value = slice_and_trim(line, start, end);
    value.parse().map_err(|_| GroError::Parse {
        line: line_num,
        kind: GroParseErrorKind::InvalidFloat {
            columns: format!("{}-{}", start + 1, end),
            value: value.into(),
        },
    })
}

/// GROMACS `.gro` coordinate files, single or multi-frame.
///
/// Coordinates and box edges are in nanometers. Velocities are ignored on
/// read and not written. Triclinic boxes are reduced to their diagonal.
pub struct GroFile;

/// Upper bound on records reserved up front; the atom count line is untrusted.
const MAX_PREALLOCATED_ATOMS: usize = 1 << 16;

struct RawFrame {
    title: String,
    atoms: Vec<(isize, String, String, usize)>,
    positions: Vec<Point3<f64>>,
    box_vectors: Option<Vector3<f64>>,
}

fn read_frame(
    lines: &mut impl Iterator<Item = (usize, io::Result<String>)>,
) -> Result<Option<RawFrame>, GroError> {
    let title = loop {
        match lines.next() {
            None => return Ok(None),
            Some((_, line)) => {
                let line = line?;
                if !line.trim().is_empty() {
                    break line.trim().to_string();
                }
            }
        }
    };

    let (count_line_num, count_line) = lines.next().ok_or(GroError::Parse {
        line: 0,
        kind: GroParseErrorKind::UnexpectedEof("atom count"),
    })?;
    let count_line = count_line?;
    let n_atoms: usize = count_line.trim().parse().map_err(|_| GroError::Parse {
        line: count_line_num + 1,
        kind: GroParseErrorKind::InvalidAtomCount(count_line.trim().into()),
    })?;

    let capacity = n_atoms.min(MAX_PREALLOCATED_ATOMS);
    let mut atoms = Vec::with_capacity(capacity);
    let mut positions = Vec::with_capacity(capacity);
    for _ in 0..n_atoms {
        let (idx, line) = lines.next().ok_or(GroError::Parse {
            line: count_line_num + 1,
            kind: GroParseErrorKind::UnexpectedEof("atom record"),
        })?;
        let line = line?;
        let line_num = idx + 1;
        if line.len() < 44 {
            return Err(GroError::Parse {
                line: line_num,
                kind: GroParseErrorKind::LineTooShort,
            });
        }
        let res_seq_str = slice_and_trim(&line, 0, 5);
        let res_seq: isize = res_seq_str.parse().map_err(|_| GroError::Parse {
            line: line_num,
            kind: GroParseErrorKind::InvalidInt {
                columns: "1-5".into(),
                value: res_seq_str.into(),
            },
        })?;
        let res_name = slice_and_trim(&line, 5, 10).to_string();
        let atom_name = slice_and_trim(&line, 10, 15).to_string();
        let serial_str = slice_and_trim(&line, 15, 20);
        let serial: usize = serial_str.parse().map_err(|_| GroError::Parse {
            line: line_num,
            kind: GroParseErrorKind::InvalidInt {
                columns: "16-20".into(),
                value: serial_str.into(),
            },
        })?;
        let x = parse_float(&line, 20, 28, line_num)?;
        let y = parse_float(&line, 28, 36, line_num)?;
        let z = parse_float(&line, 36, 44, line_num)?;
        atoms.push((res_seq, res_name, atom_name, serial));
        positions.push(Point3::new(x, y, z));
    }

    let (box_idx, box_line) = lines.next().ok_or(GroError::Parse {
        line: count_line_num + n_atoms + 1,
        kind: GroParseErrorKind::UnexpectedEof("box vectors"),
    })?;
    let box_line = box_line?;
    let values: Vec<f64> = box_line
        .split_whitespace()
        .map(|v| v.parse::<f64>())
        .collect::<Result<_, _>>()
        .map_err(|_| GroError::Parse {
            line: box_idx + 1,
            kind: GroParseErrorKind::InvalidBox,
        })?;
    if values.len() != 3 && values.len() != 9 {
        return Err(GroError::Parse {
            line: box_idx + 1,
            kind: GroParseErrorKind::InvalidBox,
        });
    }
    let edges = Vector3::new(values[0], values[1], values[2]);
    let box_vectors = edges.iter().any(|&e| e > 0.0).then_some(edges);

    Ok(Some(RawFrame {
        title,
        atoms,
        positions,
        box_vectors,
    }))
}

impl TrajectoryFile for GroFile {
    type Metadata = GroMetadata;
    type Error = GroError;

    fn read_from(reader: &mut impl BufRead) -> Result<(Trajectory, Self::Metadata), Self::Error> {
        let mut lines = reader.lines().enumerate();
        let mut metadata = GroMetadata::default();
        let mut topology: Option<Topology> = None;
        let mut frames = Vec::new();

        while let Some(raw) = read_frame(&mut lines)? {
            match &topology {
                None => {
                    let mut top = Topology::new();
                    for (res_seq, res_name, atom_name, serial) in &raw.atoms {
                        top.push_atom(atom_name, res_name, *res_seq, *serial);
                    }
                    topology = Some(top);
                }
                Some(top) if top.n_atoms() != raw.atoms.len() => {
                    return Err(GroError::Inconsistency(format!(
                        "Frame {} has {} atoms, expected {}",
                        frames.len(),
                        raw.atoms.len(),
                        top.n_atoms()
                    )));
                }
                Some(_) => {}
            }
            metadata.titles.push(raw.title);
            frames.push(Frame::new(raw.positions, raw.box_vectors));
        }

        let topology = topology.ok_or(GroError::Empty)?;
        Ok((Trajectory::new(topology, frames)?, metadata))
    }

    fn write_to(
        trajectory: &Trajectory,
        metadata: &Self::Metadata,
        writer: &mut impl Write,
    ) -> Result<(), Self::Error> {
        let topology = trajectory.topology();
        for (i, frame) in trajectory.frames().iter().enumerate() {
            let title = metadata
                .titles
                .get(i)
                .map(String::as_str)
                .unwrap_or("Generated by statesampler");
            writeln!(writer, "{}", title)?;
            writeln!(writer, "{:>5}", topology.n_atoms())?;
            for (atom, pos) in topology.atoms().iter().zip(frame.positions.iter()) {
                let residue = topology.residue_of(atom);
                writeln!(
                    writer,
                    "{:>5}{:<5}{:>5}{:>5}{:>8.3}{:>8.3}{:>8.3}",
                    residue.seq.rem_euclid(100_000),
                    residue.name,
                    atom.name,
                    atom.serial % 100_000,
                    pos.x,
                    pos.y,
                    pos.z
                )?;
            }
            let edges = frame.box_vectors.unwrap_or_else(Vector3::zeros);
            writeln!(writer, "{:>10.5}{:>10.5}{:>10.5}", edges.x, edges.y, edges.z)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const TWO_FRAMES: &str = "\
Walker 0 t= 0.0
    3
    1ALA      N    1   1.000   2.000   3.000
    1ALA     CA    2   1.100   2.100   3.100
    2SOL     OW    3   0.500   0.500   0.500  0.1000  0.2000  0.3000
   5.00000   5.00000   5.00000
Walker 0 t= 10.0
    3
    1ALA      N    1   1.500   2.000   3.000
    1ALA     CA    2   1.600   2.100   3.100
    2SOL     OW    3   0.600   0.500   0.500
   5.10000   5.10000   5.10000
";

    #[test]
    fn reads_multi_frame_file_with_topology_and_box() {
        let (traj, metadata) = GroFile::read_from(&mut Cursor::new(TWO_FRAMES)).unwrap();
        assert_eq!(traj.n_frames(), 2);
        assert_eq!(traj.n_atoms(), 3);
        assert_eq!(traj.topology().n_residues(), 2);
        assert_eq!(metadata.titles, vec!["Walker 0 t= 0.0", "Walker 0 t= 10.0"]);

        let last = traj.last_frame().unwrap();
        assert!((last.positions[0].x - 1.5).abs() < 1e-12);
        assert!((last.box_vectors.unwrap().x - 5.1).abs() < 1e-12);
        assert_eq!(traj.topology().atom(1).unwrap().name, "CA");
        assert_eq!(traj.topology().residue(1).unwrap().name, "SOL");
    }

    #[test]
    fn write_then_read_preserves_atoms_and_coordinates() {
        let (traj, metadata) = GroFile::read_from(&mut Cursor::new(TWO_FRAMES)).unwrap();
        let mut buffer = Vec::new();
        GroFile::write_to(&traj, &metadata, &mut buffer).unwrap();

        let (reread, reread_meta) = GroFile::read_from(&mut Cursor::new(buffer)).unwrap();
        assert_eq!(reread_meta, metadata);
        assert_eq!(reread.topology(), traj.topology());
        for (a, b) in reread.frames().iter().zip(traj.frames()) {
            for (p, q) in a.positions.iter().zip(&b.positions) {
                assert!((p - q).norm() < 1e-9);
            }
        }
    }

    #[test]
    fn zero_box_is_read_as_non_periodic() {
        let content = "\
t
    1
    1ALA     CA    1   0.000   0.000   0.000
   0.00000   0.00000   0.00000
";
        let (traj, _) = GroFile::read_from(&mut Cursor::new(content)).unwrap();
        assert!(traj.frames()[0].box_vectors.is_none());
    }

    #[test]
    fn invalid_inputs_are_reported() {
        assert!(matches!(
            GroFile::read_from(&mut Cursor::new("")),
            Err(GroError::Empty)
        ));
        assert!(matches!(
            GroFile::read_from(&mut Cursor::new("t\n abc\n")),
            Err(GroError::Parse {
                kind: GroParseErrorKind::InvalidAtomCount(_),
                ..
            })
        ));
        assert!(matches!(
            GroFile::read_from(&mut Cursor::new("t\n    1\n    1ALA  CA\n")),
            Err(GroError::Parse {
                kind: GroParseErrorKind::LineTooShort,
                ..
            })
        ));
        let truncated = "t\n    2\n    1ALA     CA    1   0.000   0.000   0.000\n";
        assert!(matches!(
            GroFile::read_from(&mut Cursor::new(truncated)),
            Err(GroError::Parse {
                kind: GroParseErrorKind::UnexpectedEof(_),
                ..
            })
        ));
    }

    #[test]
    fn oversized_atom_count_is_a_truncation_error() {
        let content = "t\n99999999999999999\n    1ALA     CA    1   0.000   0.000   0.000\n";
        assert!(matches!(
            GroFile::read_from(&mut Cursor::new(content)),
            Err(GroError::Parse {
                line: 2,
                kind: GroParseErrorKind::UnexpectedEof("atom record"),
            })
        ));
    }

    #[test]
    fn frames_with_different_atom_counts_are_inconsistent() {
        let content = "\
a
    1
    1ALA     CA    1   0.000   0.000   0.000
   1.0 1.0 1.0
b
    2
    1ALA     CA    1   0.000   0.000   0.000
    1ALA     CB    2   0.000   0.000   0.000
   1.0 1.0 1.0
";
        assert!(matches!(
            GroFile::read_from(&mut Cursor::new(content)),
            Err(GroError::Inconsistency(_))
        ));
    }
}
