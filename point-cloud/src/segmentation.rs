//! Plane removal and Euclidean clustering.

use crate::normals::plane_normal;
use crate::search::SpatialIndex;
use cv_core::{is_finite_point, PointCloud, Ransac, RobustConfig, RobustModel, Termination};
use nalgebra::{Point3, Vector3};
use std::collections::VecDeque;

/// Plane `ax + by + cz + d = 0` fitted from three points, with `(a, b, c)`
/// unit length.
pub struct PlaneEstimator;

impl RobustModel<Point3<f32>> for PlaneEstimator {
    type Model = [f32; 4];

    fn min_sample_size(&self) -> usize {
        3
    }

    fn estimate(&self, data: &[&Point3<f32>]) -> Option<Self::Model> {
        let p1 = data[0];
        let p2 = data[1];
        let p3 = data[2];

        let v1 = p2 - p1;
        let v2 = p3 - p1;
        let cross = v1.cross(&v2);
        let norm = cross.norm();
        if !norm.is_finite() || norm < 1e-12 {
            return None;
        }
        let normal = cross / norm;

        let d = -normal.dot(&p1.coords);
        Some([normal.x, normal.y, normal.z, d])
    }

    fn compute_error(&self, model: &Self::Model, data: &Point3<f32>) -> f64 {
        point_plane_distance(model, data) as f64
    }

    /// Least-squares plane through the inliers, oriented like `model`.
    fn refine(&self, model: &Self::Model, inliers: &[&Point3<f32>]) -> Option<Self::Model> {
        let points: Vec<Point3<f32>> = inliers.iter().map(|p| **p).collect();
        let mut normal = plane_normal(&points)?;
        if normal.dot(&Vector3::new(model[0], model[1], model[2])) < 0.0 {
            normal = -normal;
        }
        let centroid = PointCloud::new(points).centroid()?;
        let d = -normal.dot(&centroid.coords);
        Some([normal.x, normal.y, normal.z, d])
    }
}

fn point_plane_distance(model: &[f32; 4], p: &Point3<f32>) -> f32 {
    let [a, b, c, d] = *model;
    let denom = (a * a + b * b + c * c).sqrt();
    if denom < 1e-12 {
        return f32::INFINITY;
    }
    (a * p.x + b * p.y + c * p.z + d).abs() / denom
}

/// Outcome of a plane fit.
#[derive(Debug, Clone)]
pub struct PlaneSegmentation {
    /// `[a, b, c, d]`, absent when no plane could be fitted.
    pub model: Option<[f32; 4]>,
    /// Ascending indices of the points within the distance threshold.
    pub inliers: Vec<usize>,
    pub iterations: usize,
    pub termination: Termination,
}

impl PlaneSegmentation {
    /// The input cloud with the plane inliers removed.
    pub fn remaining(&self, cloud: &PointCloud) -> PointCloud {
        cloud.select_inverse(&self.inliers)
    }
}

/// Segment the dominant plane using RANSAC.
///
/// Runs at most `max_iterations` hypotheses (stopping early once the
/// adaptive 99% confidence bound is met), refits the winner to all its
/// inliers by least squares and re-selects the inliers against the refined
/// plane. Non-finite points are never inliers.
pub fn segment_plane(
    pc: &PointCloud,
    distance_threshold: f32,
    max_iterations: usize,
    seed: Option<u64>,
) -> PlaneSegmentation {
    let finite: Vec<usize> = (0..pc.len()).filter(|&i| pc.is_finite(i)).collect();
    let data: Vec<Point3<f32>> = finite.iter().map(|&i| pc.points[i]).collect();

    let config = RobustConfig {
        threshold: distance_threshold as f64,
        max_iterations,
        confidence: 0.99,
        min_sample_size: 3,
        seed,
    };

    let res = Ransac::new(config).run(&PlaneEstimator, &data);

    let inliers = match &res.model {
        Some(model) => finite
            .iter()
            .copied()
            .filter(|&i| point_plane_distance(model, &pc.points[i]) < distance_threshold)
            .collect(),
        None => Vec::new(),
    };

    tracing::debug!(
        inliers = inliers.len(),
        iterations = res.iterations,
        termination = ?res.termination,
        "plane segmentation"
    );

    PlaneSegmentation {
        model: res.model,
        inliers,
        iterations: res.iterations,
        termination: res.termination,
    }
}

/// A connected component produced by [`cluster_euclidean`].
#[derive(Debug, Clone)]
pub struct Cluster {
    /// Position in the size-ordered cluster list.
    pub label: usize,
    /// Ascending indices into the clustered cloud.
    pub indices: Vec<usize>,
    /// Dense, unorganized copy of the member points.
    pub cloud: PointCloud,
}

/// Euclidean cluster extraction.
///
/// Two points belong to the same cluster when a chain of points with
/// consecutive gaps of at most `tolerance` connects them. Clusters with
/// fewer than `min_size` or more than `max_size` points are discarded.
/// Returns member indices, each list ascending, clusters largest first.
pub fn extract_euclidean_clusters(
    pc: &PointCloud,
    tolerance: f32,
    min_size: usize,
    max_size: usize,
) -> Vec<Vec<usize>> {
    let n = pc.len();
    let index = SpatialIndex::new(&pc.points);
    let mut processed = vec![false; n];
    let mut clusters: Vec<Vec<usize>> = Vec::new();

    for i in 0..n {
        if processed[i] || !is_finite_point(&pc.points[i]) {
            continue;
        }
        processed[i] = true;

        let mut members = vec![i];
        let mut queue = VecDeque::from([i]);
        while let Some(current) = queue.pop_front() {
            for (neighbor, _) in index.within_radius(&pc.points[current], tolerance) {
                if !processed[neighbor] {
                    processed[neighbor] = true;
                    members.push(neighbor);
                    queue.push_back(neighbor);
                }
            }
        }

        if members.len() >= min_size && members.len() <= max_size {
            members.sort_unstable();
            clusters.push(members);
        }
    }

    // Stable: equal sizes keep discovery order
    clusters.sort_by(|a, b| b.len().cmp(&a.len()));
    clusters
}

/// [`extract_euclidean_clusters`], materialized as point clouds.
pub fn cluster_euclidean(pc: &PointCloud, tolerance: f32, min_size: usize, max_size: usize) -> Vec<Cluster> {
    let clusters: Vec<Cluster> = extract_euclidean_clusters(pc, tolerance, min_size, max_size)
        .into_iter()
        .enumerate()
        .map(|(label, indices)| Cluster {
            label,
            cloud: pc.select(&indices),
            indices,
        })
        .collect();

    tracing::debug!(
        clusters = clusters.len(),
        largest = clusters.first().map(|c| c.indices.len()).unwrap_or(0),
        "euclidean clustering"
    );
    clusters
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plane_with_blob() -> PointCloud {
        let mut points = Vec::new();
        for x in 0..10 {
            for y in 0..10 {
                points.push(Point3::new(x as f32, y as f32, 0.0));
            }
        }
        points.push(Point3::new(0.0, 0.0, 10.0));
        points.push(Point3::new(1.0, 1.0, 10.0));
        PointCloud::new(points)
    }

    #[test]
    fn test_segment_plane() {
        let pc = plane_with_blob();
        let seg = segment_plane(&pc, 0.1, 100, Some(42));

        let [a, b, c, d] = seg.model.unwrap();
        assert!(c.abs() > 0.99);
        assert!(a.abs() < 1e-3 && b.abs() < 1e-3);
        assert!(d.abs() < 1e-3);
        assert_eq!(seg.inliers.len(), 100);
        assert!(seg.inliers.windows(2).all(|w| w[0] < w[1]));

        let rest = seg.remaining(&pc);
        assert_eq!(rest.len(), 2);
        assert!(rest.points.iter().all(|p| p.z == 10.0));
    }

    #[test]
    fn test_segment_plane_too_few_points() {
        let pc = PointCloud::new(vec![Point3::origin(), Point3::new(1.0, 0.0, 0.0)]);
        let seg = segment_plane(&pc, 0.1, 100, Some(42));
        assert!(seg.model.is_none());
        assert!(seg.inliers.is_empty());
        assert_eq!(seg.remaining(&pc).len(), 2);
    }

    #[test]
    fn test_segment_plane_skips_nan() {
        let mut pc = plane_with_blob();
        pc.points.push(Point3::new(f32::NAN, 0.0, 0.0));
        let seg = segment_plane(&pc, 0.1, 100, Some(1));
        assert!(!seg.inliers.contains(&(pc.len() - 1)));
        assert_eq!(seg.inliers.len(), 100);
    }

    #[test]
    fn test_euclidean_clustering() {
        let mut points = Vec::new();
        // Big cluster: 12 points spaced 0.01 apart
        for i in 0..12 {
            points.push(Point3::new(i as f32 * 0.01, 0.0, 0.0));
        }
        // Small cluster far away, interleaved in the input
        for i in 0..5 {
            points.insert(i * 2, Point3::new(5.0, i as f32 * 0.01, 0.0));
        }
        // Lone point
        points.push(Point3::new(-5.0, 0.0, 0.0));
        let pc = PointCloud::new(points);

        let clusters = cluster_euclidean(&pc, 0.015, 3, 100);
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].cloud.len(), 12);
        assert_eq!(clusters[1].cloud.len(), 5);
        assert_eq!(clusters[0].label, 0);

        // Disjoint
        let mut all: Vec<usize> = clusters.iter().flat_map(|c| c.indices.clone()).collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 17);

        // Members within a cluster stay in input order
        for c in &clusters {
            assert!(c.indices.windows(2).all(|w| w[0] < w[1]));
            assert!(c.cloud.is_dense);
            assert_eq!(c.cloud.height, 1);
        }
    }

    #[test]
    fn test_cluster_size_bounds() {
        let points: Vec<_> = (0..20).map(|i| Point3::new(i as f32 * 0.01, 0.0, 0.0)).collect();
        let pc = PointCloud::new(points);
        assert!(cluster_euclidean(&pc, 0.015, 21, 100).is_empty());
        assert!(cluster_euclidean(&pc, 0.015, 1, 19).is_empty());
        assert_eq!(cluster_euclidean(&pc, 0.015, 20, 20).len(), 1);
    }
}
