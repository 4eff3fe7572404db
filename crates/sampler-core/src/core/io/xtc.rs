use crate::core::models::trajectory::Frame;
use nalgebra::{Point3, Vector3};
use std::path::Path;
use thiserror::Error;
use xdrfile::{Frame as XdrFrame, Trajectory as _, XTCTrajectory};

#[derive(Debug, Error)]
pub enum XtcError {
    #[error("XDR error: {0}")]
    Xdr(#[from] xdrfile::Error),
    #[error("Frame {frame} has {found} atoms, expected {expected}")]
    Inconsistency {
        frame: usize,
        expected: usize,
        found: usize,
    },
}

/// Compressed GROMACS `.xtc` trajectories.
///
/// An XTC file carries coordinates and box only, so frames are read without a
/// topology and paired with one by the caller. Coordinates are stored at the
/// file's precision (1e-3 nm by default). Triclinic boxes are reduced to their
/// diagonal.
pub struct XtcFile;

impl XtcFile {
    pub fn read_frames(path: &Path) -> Result<Vec<Frame>, XtcError> {
        let trajectory = XTCTrajectory::open_read(path)?;
        let mut frames = Vec::new();
        let mut expected = None;
        for raw in trajectory {
            let raw = raw?;
            let found = raw.coords.len();
            match expected {
                None => expected = Some(found),
                Some(expected) if expected != found => {
                    return Err(XtcError::Inconsistency {
                        frame: frames.len(),
                        expected,
                        found,
                    });
                }
                Some(_) => {}
            }
            frames.push(from_xdr(&raw));
        }
        Ok(frames)
    }

    pub fn write_frames(path: &Path, frames: &[Frame]) -> Result<(), XtcError> {
        let mut trajectory = XTCTrajectory::open_write(path)?;
        for (index, frame) in frames.iter().enumerate() {
            let mut raw = XdrFrame::with_len(frame.positions.len());
            raw.time = index as f32;
            for (coords, p) in raw.coords.iter_mut().zip(&frame.positions) {
                *coords = [p.x as f32, p.y as f32, p.z as f32];
            }
            if let Some(edges) = frame.box_vectors {
                raw.box_vector = [
                    [edges.x as f32, 0.0, 0.0],
                    [0.0, edges.y as f32, 0.0],
                    [0.0, 0.0, edges.z as f32],
                ];
            }
            trajectory.write(&raw)?;
        }
        trajectory.flush()?;
        Ok(())
    }
}

fn from_xdr(raw: &XdrFrame) -> Frame {
    let positions = raw
        .coords
        .iter()
        .map(|c| Point3::new(c[0] as f64, c[1] as f64, c[2] as f64))
        .collect();
    let edges = Vector3::new(
        raw.box_vector[0][0] as f64,
        raw.box_vector[1][1] as f64,
        raw.box_vector[2][2] as f64,
    );
    let box_vectors = edges.iter().any(|&e| e > 0.0).then_some(edges);
    Frame::new(positions, box_vectors)
}
