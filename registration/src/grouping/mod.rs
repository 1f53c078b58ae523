//! Correspondence grouping.
//!
//! A grouper partitions object-to-scene correspondences into geometrically
//! consistent groups. Each group is turned into a rigid pose hypothesis by a
//! RANSAC fit over its correspondences, so hypotheses and groups always come
//! out paired one to one and in the same order.

pub mod geometric_consistency;
pub mod hough;

pub use geometric_consistency::GeometricConsistencyGrouping;
pub use hough::Hough3DGrouping;

use cv_core::{estimate_rigid_transform, PointCloud, Ransac, RobustConfig, RobustModel, Result, Transform};
use cv_features::{Correspondence, ReferenceFrame};
use nalgebra::Point3;

/// Everything a grouper may look at. Indices in `correspondences` refer to
/// `object` / `scene` (and to the frame slices, which are parallel to them).
pub struct GroupingInput<'a> {
    pub object: &'a PointCloud,
    pub scene: &'a PointCloud,
    pub object_frames: &'a [ReferenceFrame],
    pub scene_frames: &'a [ReferenceFrame],
    pub correspondences: &'a [Correspondence],
}

/// A rigid transform taking object coordinates into the scene, with the
/// correspondences that support it.
#[derive(Debug, Clone)]
pub struct PoseHypothesis {
    pub transform: Transform,
    pub correspondences: Vec<Correspondence>,
}

pub trait CorrespondenceGrouping {
    fn name(&self) -> &'static str;

    /// Hypotheses ordered as their groups were found. An empty list means no
    /// consistent group exists.
    fn recognize(&self, input: &GroupingInput<'_>) -> Result<Vec<PoseHypothesis>>;
}

/// RANSAC settings used to turn a correspondence group into a pose.
#[derive(Debug, Clone)]
pub struct HypothesisConfig {
    pub inlier_threshold: f32,
    pub max_iterations: usize,
    pub seed: Option<u64>,
}

impl Default for HypothesisConfig {
    fn default() -> Self {
        Self {
            inlier_threshold: 0.01,
            max_iterations: 10000,
            seed: Some(42),
        }
    }
}

/// Rigid transform from three object/scene point pairs, scored by the
/// distance between the moved object point and its scene point.
struct RigidPairEstimator;

impl RobustModel<(Point3<f32>, Point3<f32>)> for RigidPairEstimator {
    type Model = Transform;

    fn min_sample_size(&self) -> usize {
        3
    }

    fn estimate(&self, data: &[&(Point3<f32>, Point3<f32>)]) -> Option<Self::Model> {
        let (src, dst): (Vec<_>, Vec<_>) = data.iter().map(|pair| **pair).unzip();
        estimate_rigid_transform(&src, &dst)
    }

    fn compute_error(&self, model: &Self::Model, data: &(Point3<f32>, Point3<f32>)) -> f64 {
        (model.transform_point(&data.0) - data.1).norm() as f64
    }

    fn refine(&self, _model: &Self::Model, inliers: &[&(Point3<f32>, Point3<f32>)]) -> Option<Self::Model> {
        self.estimate(inliers)
    }
}

/// Fit a pose to one correspondence group. The returned hypothesis keeps only
/// the RANSAC inliers; groups without three consistent inliers give `None`.
pub fn estimate_hypothesis(
    object: &PointCloud,
    scene: &PointCloud,
    group: &[Correspondence],
    config: &HypothesisConfig,
) -> Option<PoseHypothesis> {
    let pairs: Vec<(Point3<f32>, Point3<f32>)> = group
        .iter()
        .map(|c| (object.points[c.object_index], scene.points[c.scene_index]))
        .collect();

    let ransac = Ransac::new(RobustConfig {
        threshold: config.inlier_threshold as f64,
        max_iterations: config.max_iterations,
        confidence: 0.99,
        min_sample_size: 3,
        seed: config.seed,
    });
    let res = ransac.run(&RigidPairEstimator, &pairs);
    if res.num_inliers < 3 {
        return None;
    }
    let transform = res.model?;

    let correspondences = group
        .iter()
        .zip(&res.inliers)
        .filter(|(_, &keep)| keep)
        .map(|(c, _)| *c)
        .collect();
    Some(PoseHypothesis {
        transform,
        correspondences,
    })
}

/// Turn groups into hypotheses, dropping groups with no consistent pose.
pub(crate) fn hypotheses_from_groups(
    input: &GroupingInput<'_>,
    groups: Vec<Vec<Correspondence>>,
    config: &HypothesisConfig,
) -> Vec<PoseHypothesis> {
    groups
        .iter()
        .filter_map(|group| estimate_hypothesis(input.object, input.scene, group, config))
        .collect()
}
