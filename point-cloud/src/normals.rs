use crate::search::SpatialIndex;
use cv_core::{is_finite_point, PointCloud};
use nalgebra::{Matrix3, Point3, SymmetricEigen, Vector3};
use rayon::prelude::*;

fn nan_normal() -> Vector3<f32> {
    Vector3::repeat(f32::NAN)
}

/// Estimate one normal per point from its `k` nearest neighbours (the point
/// itself included), using PCA on the neighbourhood covariance.
///
/// Normals are unit length. When `viewpoint` is given each normal is flipped
/// to face it. Non-finite points, neighbourhoods of fewer than three points
/// and neighbourhoods without a unique plane (coincident or collinear
/// points) get a NaN normal.
pub fn estimate_normals(cloud: &PointCloud, k: usize, viewpoint: Option<&Point3<f32>>) -> Vec<Vector3<f32>> {
    if cloud.is_empty() {
        return Vec::new();
    }

    let index = SpatialIndex::new(&cloud.points);

    cloud
        .points
        .par_iter()
        .map(|p| {
            if !is_finite_point(p) {
                return nan_normal();
            }
            let neighbors: Vec<Point3<f32>> = index
                .nearest_k(p, k)
                .into_iter()
                .map(|(i, _)| cloud.points[i])
                .collect();

            let Some(mut normal) = plane_normal(&neighbors) else {
                return nan_normal();
            };

            if let Some(vp) = viewpoint {
                if normal.dot(&(vp - p)) < 0.0 {
                    normal = -normal;
                }
            }
            normal
        })
        .collect()
}

/// Copy of `cloud` with [`estimate_normals`] attached.
pub fn with_estimated_normals(cloud: &PointCloud, k: usize, viewpoint: Option<&Point3<f32>>) -> PointCloud {
    let mut out = cloud.clone();
    out.normals = Some(estimate_normals(cloud, k, viewpoint));
    out
}

/// Unit normal of the least-squares plane through `points`, or `None` when
/// the points do not pin down a plane.
pub fn plane_normal(points: &[Point3<f32>]) -> Option<Vector3<f32>> {
    if points.len() < 3 {
        return None;
    }

    // Compute centroid
    let n = points.len() as f64;
    let mut centroid = Vector3::<f64>::zeros();
    for p in points {
        centroid += Vector3::new(p.x as f64, p.y as f64, p.z as f64);
    }
    centroid /= n;

    // Compute covariance matrix
    let mut cov = Matrix3::<f64>::zeros();
    for p in points {
        let d = Vector3::new(p.x as f64, p.y as f64, p.z as f64) - centroid;
        cov += d * d.transpose();
    }
    cov /= n;

    let eigen = SymmetricEigen::new(cov);
    let mut order = [0usize, 1, 2];
    order.sort_by(|&a, &b| eigen.eigenvalues[a].total_cmp(&eigen.eigenvalues[b]));

    let largest = eigen.eigenvalues[order[2]];
    let middle = eigen.eigenvalues[order[1]];
    if largest.is_nan() || largest <= 0.0 || middle <= largest * 1e-6 {
        return None;
    }

    let normal = eigen.eigenvectors.column(order[0]).into_owned().cast::<f32>();
    let norm = normal.norm();
    if !norm.is_finite() || norm < 1e-6 {
        return None;
    }
    Some(normal / norm)
}
