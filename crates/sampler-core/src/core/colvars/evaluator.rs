//! Stateless evaluation of CV sets and their normalization transforms.

use super::cv::CollectiveVariable;
use super::error::CvError;
use crate::core::models::trajectory::Trajectory;
use nalgebra::{DMatrix, DVector};

/// CV values: a frames × CVs matrix, or a single CV's values as a vector.
#[derive(Debug, Clone, PartialEq)]
pub enum Evals {
    Matrix(DMatrix<f64>),
    Vector(DVector<f64>),
}

impl From<DMatrix<f64>> for Evals {
    fn from(matrix: DMatrix<f64>) -> Self {
        Evals::Matrix(matrix)
    }
}

impl From<DVector<f64>> for Evals {
    fn from(vector: DVector<f64>) -> Self {
        Evals::Vector(vector)
    }
}

/// Evaluates every CV on the same trajectory, one column per CV.
pub fn evaluate(
    cvs: &[CollectiveVariable],
    trajectory: &Trajectory,
) -> Result<DMatrix<f64>, CvError> {
    let n_frames = trajectory.n_frames();
    let mut result = DMatrix::zeros(n_frames, cvs.len());
    for (j, cv) in cvs.iter().enumerate() {
        let column = cv.eval(trajectory)?;
        if column.len() != n_frames {
            return Err(CvError::ShapeMismatch {
                expected: format!("{n_frames} values for CV '{}'", cv.id()),
                found: format!("{} values", column.len()),
            });
        }
        result.set_column(j, &column);
    }
    Ok(result)
}

/// Like [`evaluate`], but reports values in physical units.
pub fn evaluate_rescaled(
    cvs: &[CollectiveVariable],
    trajectory: &Trajectory,
) -> Result<DMatrix<f64>, CvError> {
    let normalized = evaluate(cvs, trajectory)?;
    map_columns(cvs, &normalized, CollectiveVariable::rescale)
}

pub fn rescale(cvs: &[CollectiveVariable], evals: &Evals) -> Result<Evals, CvError> {
    transform(cvs, evals, CollectiveVariable::rescale)
}

/// Inverse of [`rescale`].
pub fn scale_to_normalized(cvs: &[CollectiveVariable], evals: &Evals) -> Result<Evals, CvError> {
    transform(cvs, evals, CollectiveVariable::scale_to_normalized)
}

fn transform(
    cvs: &[CollectiveVariable],
    evals: &Evals,
    f: fn(&CollectiveVariable, f64) -> f64,
) -> Result<Evals, CvError> {
    match evals {
        Evals::Vector(values) => {
            let cv = cvs.first().ok_or(CvError::NoCvs)?;
            Ok(Evals::Vector(values.map(|x| f(cv, x))))
        }
        Evals::Matrix(values) => map_columns(cvs, values, f).map(Evals::Matrix),
    }
}

fn map_columns(
    cvs: &[CollectiveVariable],
    values: &DMatrix<f64>,
    f: fn(&CollectiveVariable, f64) -> f64,
) -> Result<DMatrix<f64>, CvError> {
    if values.ncols() != cvs.len() {
        return Err(CvError::ShapeMismatch {
            expected: format!("{} columns", cvs.len()),
            found: format!("{} columns", values.ncols()),
        });
    }
    let mut result = values.clone();
    for (j, cv) in cvs.iter().enumerate() {
        result.column_mut(j).apply(|x| *x = f(cv, *x));
    }
    Ok(result)
}

fn map_point(
    cvs: &[CollectiveVariable],
    point: &DVector<f64>,
    f: fn(&CollectiveVariable, f64) -> f64,
) -> Result<DVector<f64>, CvError> {
    if point.len() != cvs.len() {
        return Err(CvError::ShapeMismatch {
            expected: format!("{} coordinates", cvs.len()),
            found: format!("{} coordinates", point.len()),
        });
    }
    Ok(DVector::from_iterator(
        point.len(),
        cvs.iter().zip(point.iter()).map(|(cv, &x)| f(cv, x)),
    ))
}

/// Rescales a point with one coordinate per CV.
pub fn rescale_point(
    cvs: &[CollectiveVariable],
    point: &DVector<f64>,
) -> Result<DVector<f64>, CvError> {
    map_point(cvs, point, CollectiveVariable::rescale)
}

pub fn scale_point(
    cvs: &[CollectiveVariable],
    point: &DVector<f64>,
) -> Result<DVector<f64>, CvError> {
    map_point(cvs, point, CollectiveVariable::scale_to_normalized)
}

/// Rescales points stored one per row.
pub fn rescale_points(
    cvs: &[CollectiveVariable],
    points: &DMatrix<f64>,
) -> Result<DMatrix<f64>, CvError> {
    map_columns(cvs, points, CollectiveVariable::rescale)
}

pub fn scale_points(
    cvs: &[CollectiveVariable],
    points: &DMatrix<f64>,
) -> Result<DMatrix<f64>, CvError> {
    map_columns(cvs, points, CollectiveVariable::scale_to_normalized)
}

/// Fits every CV on the same trajectories, returning the normalized set.
pub fn normalize_cvs(
    cvs: &[CollectiveVariable],
    trajectories: &[Trajectory],
) -> Result<Vec<CollectiveVariable>, CvError> {
    cvs.iter()
        .map(|cv| {
            let current = cv.normalization();
            let fitted = cv.normalize(trajectories, current.scale, current.offset)?;
            Ok(cv.clone().with_normalization(fitted))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::colvars::contact::{ContactCv, ContactScheme};
    use crate::core::colvars::cv::{CvKind, Normalization};
    use crate::core::models::topology::Topology;
    use crate::core::models::trajectory::Frame;
    use nalgebra::Point3;

    fn dimer_trajectory(separations: &[f64]) -> Trajectory {
        let mut top = Topology::new();
        top.push_atom("CA", "ALA", 1, 1);
        top.push_atom("CA", "GLY", 2, 2);
        let frames = separations
            .iter()
            .map(|&d| {
                Frame::new(
                    vec![Point3::origin(), Point3::new(d, 0.0, 0.0)],
                    None,
                )
            })
            .collect();
        Trajectory::new(top, frames).unwrap()
    }

    fn contact_cvs() -> Vec<CollectiveVariable> {
        let contact = ContactCv::new(1, 2).with_scheme(ContactScheme::Ca);
        vec![
            CollectiveVariable::new("d")
                .with_generator(CvKind::Contact(contact.clone()))
                .with_normalization(Normalization::new(2.0, 1.0)),
            CollectiveVariable::new("inv").with_generator(CvKind::InverseContact(contact)),
        ]
    }

    #[test]
    fn evaluate_stacks_cvs_column_wise() {
        let traj = dimer_trajectory(&[1.0, 2.0, 4.0]);
        let evals = evaluate(&contact_cvs(), &traj).unwrap();
        assert_eq!(evals.shape(), (3, 2));
        assert!((evals[(0, 0)] - 0.0).abs() < 1e-12);
        assert!((evals[(2, 0)] - 1.5).abs() < 1e-12);
        assert!((evals[(1, 1)] - 0.5).abs() < 1e-12);
        assert!((evals[(2, 1)] - 0.25).abs() < 1e-12);
    }

    #[test]
    fn evaluate_rescaled_reports_physical_values() {
        let traj = dimer_trajectory(&[1.0, 3.0]);
        let evals = evaluate_rescaled(&contact_cvs(), &traj).unwrap();
        assert!((evals[(1, 0)] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn rescale_and_scale_invert_each_other_for_matrices_and_vectors() {
        let cvs = contact_cvs();
        let matrix = Evals::from(DMatrix::from_row_slice(2, 2, &[0.1, 0.2, 0.9, -1.0]));
        let back = scale_to_normalized(&cvs, &rescale(&cvs, &matrix).unwrap()).unwrap();
        let (Evals::Matrix(a), Evals::Matrix(b)) = (&matrix, &back) else {
            panic!("shape changed");
        };
        assert!((a - b).abs().max() < 1e-12);

        let vector = Evals::from(DVector::from_vec(vec![0.0, 0.5, 1.0]));
        let Evals::Vector(rescaled) = rescale(&cvs, &vector).unwrap() else {
            panic!("shape changed");
        };
        assert!((rescaled[1] - 2.0).abs() < 1e-12);
        assert!(rescale(&[], &vector).is_err());
    }

    #[test]
    fn points_are_transformed_per_coordinate() {
        let cvs = contact_cvs();
        let point = DVector::from_vec(vec![1.0, 0.5]);
        let rescaled = rescale_point(&cvs, &point).unwrap();
        assert!((rescaled[0] - 3.0).abs() < 1e-12);
        assert!((rescaled[1] - 0.5).abs() < 1e-12);
        assert!((scale_point(&cvs, &rescaled).unwrap() - &point).norm() < 1e-12);

        let points = DMatrix::from_row_slice(2, 2, &[1.0, 0.5, 0.0, 0.0]);
        let rescaled = rescale_points(&cvs, &points).unwrap();
        assert!((rescaled[(1, 0)] - 1.0).abs() < 1e-12);
        assert!((scale_points(&cvs, &rescaled).unwrap() - points).norm() < 1e-12);

        assert!(rescale_point(&cvs, &DVector::from_vec(vec![1.0])).is_err());
    }

    #[test]
    fn normalize_cvs_maps_observed_range_to_unit_interval() {
        let trajs = [dimer_trajectory(&[1.0, 2.0]), dimer_trajectory(&[3.0])];
        let normalized = normalize_cvs(&contact_cvs(), &trajs).unwrap();
        let evals = evaluate(&normalized, &trajs[1]).unwrap();
        assert!((evals[(0, 0)] - 1.0).abs() < 1e-12);
        assert!(evals[(0, 1)].abs() < 1e-12);
        assert!((normalized[0].normalization().offset - 1.0).abs() < 1e-12);
    }
}
