use nalgebra::{Matrix3, Point3, Vector3};

/// Rigid-body transform that maps a mobile coordinate set onto a target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Superposition {
    pub rotation: Matrix3<f64>,
    pub mobile_centroid: Point3<f64>,
    pub target_centroid: Point3<f64>,
}

impl Superposition {
    pub fn apply(&self, point: &Point3<f64>) -> Point3<f64> {
        self.target_centroid + self.rotation * (point - self.mobile_centroid)
    }
}

pub fn centroid(points: &[Point3<f64>]) -> Option<Point3<f64>> {
    if points.is_empty() {
        return None;
    }
    let sum = points
        .iter()
        .fold(Vector3::zeros(), |acc, p| acc + p.coords);
    Some(Point3::from(sum / points.len() as f64))
}

/// Displacement from `a` to `b`, wrapped to the nearest periodic image of an
/// orthorhombic box. Box edges that are zero or negative are ignored.
pub fn minimum_image_displacement(
    a: &Point3<f64>,
    b: &Point3<f64>,
    box_vectors: &Vector3<f64>,
) -> Vector3<f64> {
    let mut d = b - a;
    for k in 0..3 {
        let edge = box_vectors[k];
        if edge > 0.0 {
            d[k] -= edge * (d[k] / edge).round();
        }
    }
    d
}

pub fn distance(a: &Point3<f64>, b: &Point3<f64>, box_vectors: Option<&Vector3<f64>>) -> f64 {
    match box_vectors {
        Some(bv) => minimum_image_displacement(a, b, bv).norm(),
        None => (b - a).norm(),
    }
}

/// Computes the least-squares rotation (Kabsch) superposing `mobile` on `target`.
///
/// Returns `None` when the sets differ in length, are empty, or the SVD fails.
pub fn kabsch(mobile: &[Point3<f64>], target: &[Point3<f64>]) -> Option<Superposition> {
    if mobile.len() != target.len() || mobile.is_empty() {
        return None;
    }
    let mobile_centroid = centroid(mobile)?;
    let target_centroid = centroid(target)?;

    let mut covariance = Matrix3::zeros();
    for (p, q) in mobile.iter().zip(target.iter()) {
        covariance += (p - mobile_centroid) * (q - target_centroid).transpose();
    }

    let svd = covariance.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let v = v_t.transpose();
    let handedness = (v * u.transpose()).determinant().signum();
    let correction = Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, handedness));
    let rotation = v * correction * u.transpose();

    Some(Superposition {
        rotation,
        mobile_centroid,
        target_centroid,
    })
}

pub fn calculate_rmsd(coords1: &[Point3<f64>], coords2: &[Point3<f64>]) -> Option<f64> {
    if coords1.len() != coords2.len() || coords1.is_empty() {
        return None;
    }
    let n = coords1.len() as f64;
    let squared_dist_sum: f64 = coords1
        .iter()
        .zip(coords2.iter())
        .map(|(p1, p2)| (p1 - p2).norm_squared())
        .sum();
    Some((squared_dist_sum / n).sqrt())
}

/// RMSD after optimal superposition of `mobile` onto `target`.
pub fn superposed_rmsd(mobile: &[Point3<f64>], target: &[Point3<f64>]) -> Option<f64> {
    let fit = kabsch(mobile, target)?;
    let moved: Vec<Point3<f64>> = mobile.iter().map(|p| fit.apply(p)).collect();
    calculate_rmsd(&moved, target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Rotation3, Unit};

    fn sample_points() -> Vec<Point3<f64>> {
        vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.5, 0.0, 0.0),
            Point3::new(1.5, 1.2, 0.0),
            Point3::new(0.3, 1.1, 0.9),
            Point3::new(-0.7, 0.4, 1.6),
        ]
    }

    #[test]
    fn minimum_image_wraps_across_box_edges() {
        let box_vectors = Vector3::new(3.0, 3.0, 3.0);
        let a = Point3::new(0.1, 0.1, 0.1);
        let b = Point3::new(2.9, 0.1, 0.1);
        let d = minimum_image_displacement(&a, &b, &box_vectors);
        assert!((d.x + 0.2).abs() < 1e-12);
        assert!((distance(&a, &b, Some(&box_vectors)) - 0.2).abs() < 1e-12);
        assert!((distance(&a, &b, None) - 2.8).abs() < 1e-12);
    }

    #[test]
    fn minimum_image_ignores_degenerate_box_edges() {
        let box_vectors = Vector3::new(0.0, 0.0, 0.0);
        let a = Point3::new(0.0, 0.0, 0.0);
        let b = Point3::new(5.0, 0.0, 0.0);
        assert!((distance(&a, &b, Some(&box_vectors)) - 5.0).abs() < 1e-12);
    }

    #[test]
    fn kabsch_recovers_rigid_motion() {
        let target = sample_points();
        let rotation = Rotation3::from_axis_angle(
            &Unit::new_normalize(Vector3::new(0.3, -1.0, 0.5)),
            1.1,
        );
        let shift = Vector3::new(4.0, -2.0, 0.5);
        let mobile: Vec<Point3<f64>> = target.iter().map(|p| rotation * p + shift).collect();

        let rmsd = superposed_rmsd(&mobile, &target).unwrap();
        assert!(rmsd < 1e-9, "rmsd was {}", rmsd);
    }

    #[test]
    fn kabsch_does_not_reflect_mirror_images() {
        let target = sample_points();
        let mirrored: Vec<Point3<f64>> =
            target.iter().map(|p| Point3::new(-p.x, p.y, p.z)).collect();
        let fit = kabsch(&mirrored, &target).unwrap();
        assert!((fit.rotation.determinant() - 1.0).abs() < 1e-9);
        assert!(superposed_rmsd(&mirrored, &target).unwrap() > 1e-3);
    }

    #[test]
    fn rmsd_requires_matching_non_empty_sets() {
        let points = sample_points();
        assert!(calculate_rmsd(&points, &points[..2]).is_none());
        assert!(calculate_rmsd(&[], &[]).is_none());
        assert_eq!(calculate_rmsd(&points, &points), Some(0.0));
    }

    #[test]
    fn centroid_of_empty_set_is_none() {
        assert!(centroid(&[]).is_none());
        let c = centroid(&[Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 4.0, 6.0)]).unwrap();
        assert_eq!(c, Point3::new(1.0, 2.0, 3.0));
    }
}
