//! Local reference frames.
//!
//! [`BoardEstimator`] computes a repeatable orthonormal frame per point from
//! its surface neighbourhood (Borders Of Adjacent Regions Detection):
//!
//! - z: normal of the least-squares plane through the neighbourhood, flipped
//!   to agree with the mean of the neighbours' estimated normals
//! - x: tangent direction toward the margin point whose normal deviates the
//!   most from z; when the margin has a large angular gap (an occluded or
//!   open border) the middle of that gap is used instead
//! - y: `z × x`
//!
//! Frames that cannot be computed are filled with NaN.

use crate::{FeatureError, Result};
use cv_core::{is_finite_point, PointCloud};
use cv_point_cloud::normals::plane_normal;
use cv_point_cloud::SpatialIndex;
use nalgebra::{Matrix3, Point3, Vector3};
use rayon::prelude::*;
use std::f32::consts::TAU;

/// Orthonormal, right-handed frame attached to a surface point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceFrame {
    pub x_axis: Vector3<f32>,
    pub y_axis: Vector3<f32>,
    pub z_axis: Vector3<f32>,
}

impl ReferenceFrame {
    pub fn new(x_axis: Vector3<f32>, z_axis: Vector3<f32>) -> Self {
        Self {
            x_axis,
            y_axis: z_axis.cross(&x_axis),
            z_axis,
        }
    }

    pub fn nan() -> Self {
        let nan = Vector3::repeat(f32::NAN);
        Self {
            x_axis: nan,
            y_axis: nan,
            z_axis: nan,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x_axis
            .iter()
            .chain(self.y_axis.iter())
            .chain(self.z_axis.iter())
            .all(|v| v.is_finite())
    }

    /// Rotation whose rows are the axes: maps world offsets into the frame.
    pub fn to_local(&self) -> Matrix3<f32> {
        Matrix3::from_rows(&[
            self.x_axis.transpose(),
            self.y_axis.transpose(),
            self.z_axis.transpose(),
        ])
    }
}

/// BOARD reference frame estimation.
#[derive(Debug, Clone)]
pub struct BoardEstimator {
    radius: f32,
    find_holes: bool,
    margin_threshold: f32,
    hole_size_threshold: f32,
    margin_sectors: usize,
}

impl Default for BoardEstimator {
    fn default() -> Self {
        Self {
            radius: 0.015,
            find_holes: true,
            margin_threshold: 0.85,
            hole_size_threshold: 0.2,
            margin_sectors: 24,
        }
    }
}

impl BoardEstimator {
    pub fn new(radius: f32) -> Self {
        Self {
            radius,
            ..Default::default()
        }
    }

    pub fn with_find_holes(mut self, find_holes: bool) -> Self {
        self.find_holes = find_holes;
        self
    }

    /// Neighbours farther than `threshold * radius` form the margin.
    pub fn with_margin_threshold(mut self, threshold: f32) -> Self {
        self.margin_threshold = threshold;
        self
    }

    /// Smallest angular gap, as a fraction of the full turn, treated as a hole.
    pub fn with_hole_size_threshold(mut self, threshold: f32) -> Self {
        self.hole_size_threshold = threshold;
        self
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// One frame per point of `cloud`, searching neighbours in the same
    /// cloud. `cloud` must carry normals.
    pub fn compute(&self, cloud: &PointCloud) -> Result<Vec<ReferenceFrame>> {
        if cloud.normals.is_none() {
            return Err(FeatureError::ReferenceFrameError(
                "BOARD frames need a cloud with normals".to_string(),
            ));
        }
        let index = SpatialIndex::new(&cloud.points);
        Ok(cloud
            .points
            .par_iter()
            .map(|p| self.compute_frame(p, cloud, &index))
            .collect())
    }

    fn compute_frame(&self, p: &Point3<f32>, surface: &PointCloud, index: &SpatialIndex) -> ReferenceFrame {
        if !is_finite_point(p) {
            return ReferenceFrame::nan();
        }

        let neighbors = index.within_radius(p, self.radius);
        let positions: Vec<Point3<f32>> = neighbors.iter().map(|&(i, _)| surface.points[i]).collect();

        // z axis
        let Some(mut z) = plane_normal(&positions) else {
            return ReferenceFrame::nan();
        };
        let mean_normal: Vector3<f32> = neighbors
            .iter()
            .filter_map(|&(i, _)| surface.normal(i))
            .sum();
        if mean_normal.dot(&z) < 0.0 {
            z = -z;
        }

        // x axis candidates: margin points projected onto the tangent plane
        let margin_sq = (self.margin_threshold * self.radius).powi(2);
        let mut best: Option<(f32, Vector3<f32>)> = None;
        let mut tangents: Vec<Vector3<f32>> = Vec::new();
        for &(i, d2) in &neighbors {
            if d2 <= margin_sq {
                continue;
            }
            let Some(tangent) = project_on_plane(&(surface.points[i] - p), &z) else {
                continue;
            };
            tangents.push(tangent);
            let Some(n) = surface.normal(i) else {
                continue;
            };
            let cos = n.dot(&z);
            if best.map_or(true, |(best_cos, _)| cos < best_cos) {
                best = Some((cos, tangent));
            }
        }

        // No usable margin normal: fall back to the farthest neighbour
        let x = match best {
            Some((_, tangent)) => tangent,
            None => {
                let Some(&(far, _)) = neighbors.iter().max_by(|a, b| a.1.total_cmp(&b.1)) else {
                    return ReferenceFrame::nan();
                };
                match project_on_plane(&(surface.points[far] - p), &z) {
                    Some(t) => t,
                    None => return ReferenceFrame::nan(),
                }
            }
        };

        let x = if self.find_holes {
            self.largest_hole_direction(&x, &z, &tangents).unwrap_or(x)
        } else {
            x
        };

        ReferenceFrame::new(x, z)
    }

    /// Bisector of the widest run of empty margin sectors, measured from
    /// `x`, when that run is at least the hole size threshold.
    fn largest_hole_direction(
        &self,
        x: &Vector3<f32>,
        z: &Vector3<f32>,
        tangents: &[Vector3<f32>],
    ) -> Option<Vector3<f32>> {
        let sectors = self.margin_sectors;
        if tangents.is_empty() || sectors == 0 {
            return None;
        }
        let y = z.cross(x);
        let width = TAU / sectors as f32;

        // Sector 0 is centred on x
        let mut occupied = vec![false; sectors];
        for t in tangents {
            let angle = (t.dot(&y).atan2(t.dot(x)) + width * 0.5).rem_euclid(TAU);
            let sector = ((angle / width) as usize).min(sectors - 1);
            occupied[sector] = true;
        }

        // Longest circular run of empty sectors
        let mut best: Option<(usize, usize)> = None;
        for start in 0..sectors {
            let prev = (start + sectors - 1) % sectors;
            if occupied[start] || !occupied[prev] {
                continue;
            }
            let mut len = 0;
            while len < sectors && !occupied[(start + len) % sectors] {
                len += 1;
            }
            if best.map_or(true, |(_, best_len)| len > best_len) {
                best = Some((start, len));
            }
        }

        let (start, len) = best?;
        if (len as f32) < self.hole_size_threshold * sectors as f32 {
            return None;
        }
        let mid = (start as f32 + len as f32 * 0.5) * width - width * 0.5;
        Some((x * mid.cos() + y * mid.sin()).normalize())
    }
}

fn project_on_plane(v: &Vector3<f32>, normal: &Vector3<f32>) -> Option<Vector3<f32>> {
    let t = v - normal * v.dot(normal);
    let norm = t.norm();
    if norm.is_finite() && norm > 1e-9 {
        Some(t / norm)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_point_cloud::normals::with_estimated_normals;

    fn orthonormal(frame: &ReferenceFrame) -> bool {
        let r = frame.to_local();
        (r * r.transpose() - Matrix3::identity()).norm() < 1e-4 && (r.determinant() - 1.0).abs() < 1e-4
    }

    fn dome() -> PointCloud {
        let mut points = Vec::new();
        for i in -10..=10 {
            for j in -10..=10 {
                let x = i as f32 * 0.002;
                let y = j as f32 * 0.002;
                let z = 1.0 - (4.0 * x * x + 8.0 * y * y + 3.0 * x * y) + 40.0 * x * x * x + 70.0 * x * y * y + 90.0 * y * y * y;
                points.push(Point3::new(x, y, z));
            }
        }
        with_estimated_normals(&PointCloud::new(points), 10, Some(&Point3::origin()))
    }

    #[test]
    fn test_frames_are_orthonormal() {
        let cloud = dome();
        let frames = BoardEstimator::new(0.01).compute(&cloud).unwrap();
        assert_eq!(frames.len(), cloud.len());
        let valid: Vec<_> = frames.iter().filter(|f| f.is_finite()).collect();
        assert!(!valid.is_empty());
        for f in valid {
            assert!(orthonormal(f));
        }
    }

    #[test]
    fn test_z_axis_follows_normals() {
        let cloud = dome();
        let frames = BoardEstimator::new(0.01).compute(&cloud).unwrap();
        let center = cloud.len() / 2;
        assert!(frames[center].is_finite());
        // Normals face the origin, so the frame z points down
        assert!(frames[center].z_axis.z < -0.9);
    }

    #[test]
    fn test_frames_follow_rigid_motion() {
        let cloud = dome();
        let rotation = nalgebra::Rotation3::from_axis_angle(&Vector3::z_axis(), 0.7);
        let motion = cv_core::compose_rigid(rotation.matrix(), &Vector3::new(0.0, 0.0, 0.2));
        let moved = cloud.transformed(&motion);

        let estimator = BoardEstimator::new(0.01);
        let a = estimator.compute(&cloud).unwrap();
        let b = estimator.compute(&moved).unwrap();
        let center = cloud.len() / 2;
        let expected_x = rotation * a[center].x_axis;
        let expected_z = rotation * a[center].z_axis;
        assert!((b[center].z_axis - expected_z).norm() < 1e-3);
        assert!((b[center].x_axis - expected_x).norm() < 1e-3);
    }

    #[test]
    fn test_isolated_point_is_nan() {
        let cloud = with_estimated_normals(
            &PointCloud::new(vec![Point3::new(0.0, 0.0, 1.0), Point3::new(1.0, 0.0, 1.0)]),
            10,
            None,
        );
        let frames = BoardEstimator::default().compute(&cloud).unwrap();
        assert!(frames.iter().all(|f| !f.is_finite()));
    }

    #[test]
    fn test_missing_normals_is_an_error() {
        let cloud = PointCloud::new(vec![Point3::origin()]);
        assert!(BoardEstimator::default().compute(&cloud).is_err());
    }
}
