use crate::config::{FeatureConfig, PreprocessConfig};
use cv_core::{PointCloud, Result};
use cv_features::{BoardEstimator, Correspondence, Matcher, ReferenceFrame, ShotDescriptor, ShotEstimator};
use cv_point_cloud::with_estimated_normals;
use nalgebra::Point3;

/// A cloud with normals, one reference frame and one descriptor per point.
#[derive(Debug, Clone)]
pub struct DescribedCloud {
    pub cloud: PointCloud,
    pub frames: Vec<ReferenceFrame>,
    pub descriptors: Vec<ShotDescriptor>,
}

impl DescribedCloud {
    pub fn valid_descriptors(&self) -> usize {
        self.descriptors.iter().filter(|d| d.is_valid()).count()
    }
}

/// BOARD frames, SHOT descriptors and nearest-neighbour matching, with the
/// normal estimation settings used for scene clusters.
#[derive(Debug, Clone)]
pub struct FeatureMatcher {
    board: BoardEstimator,
    shot: ShotEstimator,
    matcher: Matcher,
    normal_k: usize,
    viewpoint: Option<Point3<f32>>,
}

impl FeatureMatcher {
    pub fn new(features: &FeatureConfig, preprocess: &PreprocessConfig) -> Self {
        Self {
            board: BoardEstimator::new(features.reference_frame_radius).with_find_holes(features.find_holes),
            shot: ShotEstimator::new(features.descriptor_radius),
            matcher: Matcher::new().with_max_squared_distance(features.max_descriptor_distance),
            normal_k: preprocess.normal_k,
            viewpoint: preprocess.viewpoint_point(),
        }
    }

    /// Describe every point of a cloud that already carries normals. The
    /// cloud itself is the descriptor support surface.
    pub fn describe(&self, cloud: &PointCloud) -> Result<DescribedCloud> {
        let frames = self.board.compute(cloud)?;
        let descriptors = self.shot.compute(cloud, cloud)?;
        Ok(DescribedCloud {
            cloud: cloud.clone(),
            frames,
            descriptors,
        })
    }

    /// Estimate normals for a scene cluster, then describe it.
    pub fn describe_cluster(&self, cluster: &PointCloud) -> Result<DescribedCloud> {
        let with_normals = with_estimated_normals(cluster, self.normal_k, self.viewpoint.as_ref());
        self.describe(&with_normals)
    }

    /// Scene-ordered correspondences from scene descriptors to their nearest
    /// object descriptors.
    pub fn match_features(&self, object: &DescribedCloud, scene: &DescribedCloud) -> Vec<Correspondence> {
        self.matcher.match_descriptors(&object.descriptors, &scene.descriptors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_point_cloud::synthetic::sample_box;
    use nalgebra::Vector3;

    fn matcher() -> FeatureMatcher {
        FeatureMatcher::new(&FeatureConfig::default(), &PreprocessConfig::default())
    }

    #[test]
    fn test_cluster_matches_itself() {
        let cloud = sample_box(Point3::new(0.0, 0.0, 0.8), Vector3::new(0.04, 0.05, 0.06), 0.005);
        let m = matcher();
        let described = m.describe_cluster(&cloud).unwrap();
        assert_eq!(described.frames.len(), cloud.len());
        assert_eq!(described.descriptors.len(), cloud.len());
        assert!(described.valid_descriptors() > 0);

        let corrs = m.match_features(&described, &described);
        assert_eq!(corrs.len(), described.valid_descriptors());
        assert!(corrs.iter().all(|c| c.distance < 0.25));
    }

    #[test]
    fn test_describe_needs_normals() {
        let cloud = sample_box(Point3::new(0.0, 0.0, 0.8), Vector3::repeat(0.04), 0.005);
        assert!(matcher().describe(&cloud).is_err());
    }
}
