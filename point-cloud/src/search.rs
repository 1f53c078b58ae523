//! Spatial index over a point set.
//!
//! Wraps an `rstar` R-tree of indexed points. Non-finite points are never
//! inserted, so they can neither be returned nor act as neighbours. All
//! distances handed back are squared Euclidean distances.

use cv_core::is_finite_point;
use nalgebra::Point3;
use rstar::{PointDistance, RTree, RTreeObject, AABB};

// Wrapper for RTree
#[derive(Debug, Clone, Copy)]
struct PointWrapper(usize, [f32; 3]);

impl RTreeObject for PointWrapper {
    type Envelope = AABB<[f32; 3]>;
    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.1)
    }
}

impl PointDistance for PointWrapper {
    fn distance_2(&self, point: &[f32; 3]) -> f32 {
        let dx = self.1[0] - point[0];
        let dy = self.1[1] - point[1];
        let dz = self.1[2] - point[2];
        dx * dx + dy * dy + dz * dz
    }
}

pub struct SpatialIndex {
    tree: RTree<PointWrapper>,
}

impl SpatialIndex {
    pub fn new(points: &[Point3<f32>]) -> Self {
        let wrappers: Vec<PointWrapper> = points
            .iter()
            .enumerate()
            .filter(|(_, p)| is_finite_point(p))
            .map(|(i, p)| PointWrapper(i, [p.x, p.y, p.z]))
            .collect();
        Self {
            tree: RTree::bulk_load(wrappers),
        }
    }

    /// Number of indexed (finite) points.
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Closest indexed point to `query` as `(index, squared_distance)`.
    pub fn nearest(&self, query: &Point3<f32>) -> Option<(usize, f32)> {
        if !is_finite_point(query) {
            return None;
        }
        self.tree
            .nearest_neighbor_iter_with_distance_2(&[query.x, query.y, query.z])
            .next()
            .map(|(w, d2)| (w.0, d2))
    }

    /// Up to `k` closest points, ordered by increasing distance. A query that
    /// is itself indexed is returned as its own first neighbour.
    pub fn nearest_k(&self, query: &Point3<f32>, k: usize) -> Vec<(usize, f32)> {
        if k == 0 || !is_finite_point(query) {
            return Vec::new();
        }
        self.tree
            .nearest_neighbor_iter_with_distance_2(&[query.x, query.y, query.z])
            .take(k)
            .map(|(w, d2)| (w.0, d2))
            .collect()
    }

    /// All points with `distance <= radius`, ordered by index.
    pub fn within_radius(&self, query: &Point3<f32>, radius: f32) -> Vec<(usize, f32)> {
        if radius.is_nan() || radius < 0.0 || !is_finite_point(query) {
            return Vec::new();
        }
        let q = [query.x, query.y, query.z];
        let mut found: Vec<(usize, f32)> = self
            .tree
            .locate_within_distance(q, radius * radius)
            .map(|w| (w.0, w.distance_2(&q)))
            .collect();
        found.sort_unstable_by_key(|&(i, _)| i);
        found
    }
}
