use super::{hypotheses_from_groups, CorrespondenceGrouping, GroupingInput, HypothesisConfig, PoseHypothesis};
use cv_core::{Error, Result};
use cv_features::Correspondence;

/// Pairwise geometric consistency grouping.
///
/// Two correspondences agree when the distance between their object points
/// matches the distance between their scene points to within `consensus_size`.
/// Starting from the best remaining correspondence (smallest descriptor
/// distance), a group greedily absorbs every unused correspondence that
/// agrees with all current members. Groups larger than `threshold` are kept
/// and their members retired. Reference frames are not used.
#[derive(Debug, Clone)]
pub struct GeometricConsistencyGrouping {
    consensus_size: f32,
    threshold: usize,
    hypothesis: HypothesisConfig,
}

impl Default for GeometricConsistencyGrouping {
    fn default() -> Self {
        Self {
            consensus_size: 0.01,
            threshold: 5,
            hypothesis: HypothesisConfig::default(),
        }
    }
}

impl GeometricConsistencyGrouping {
    pub fn new(consensus_size: f32, threshold: usize) -> Self {
        Self {
            consensus_size,
            threshold,
            hypothesis: HypothesisConfig {
                inlier_threshold: consensus_size,
                ..Default::default()
            },
        }
    }

    pub fn with_hypothesis_config(mut self, config: HypothesisConfig) -> Self {
        self.hypothesis = config;
        self
    }

    pub fn cluster_correspondences(&self, input: &GroupingInput<'_>) -> Result<Vec<Vec<Correspondence>>> {
        if self.consensus_size.is_nan() || self.consensus_size <= 0.0 {
            return Err(Error::InvalidInput(format!(
                "Consensus size must be positive, got {}",
                self.consensus_size
            )));
        }

        let corrs = input.correspondences;
        for c in corrs {
            if c.object_index >= input.object.len() || c.scene_index >= input.scene.len() {
                return Err(Error::InvalidInput(format!(
                    "Correspondence ({}, {}) is out of range",
                    c.object_index, c.scene_index
                )));
            }
        }

        let mut order: Vec<usize> = (0..corrs.len()).collect();
        order.sort_by(|&a, &b| corrs[a].distance.total_cmp(&corrs[b].distance));

        let mut taken = vec![false; corrs.len()];
        let mut groups = Vec::new();

        for &seed in &order {
            if taken[seed] {
                continue;
            }
            let mut consensus = vec![seed];

            for &candidate in &order {
                if candidate == seed || taken[candidate] {
                    continue;
                }
                if consensus.iter().all(|&member| self.agrees(input, &corrs[member], &corrs[candidate])) {
                    consensus.push(candidate);
                }
            }

            if consensus.len() > self.threshold {
                for &member in &consensus {
                    taken[member] = true;
                }
                groups.push(consensus.into_iter().map(|i| corrs[i]).collect());
            }
        }

        tracing::debug!(
            correspondences = corrs.len(),
            groups = groups.len(),
            "geometric consistency grouping"
        );
        Ok(groups)
    }

    fn agrees(&self, input: &GroupingInput<'_>, a: &Correspondence, b: &Correspondence) -> bool {
        if a.object_index == b.object_index || a.scene_index == b.scene_index {
            return false;
        }
        let object_dist = (input.object.points[a.object_index] - input.object.points[b.object_index]).norm();
        let scene_dist = (input.scene.points[a.scene_index] - input.scene.points[b.scene_index]).norm();
        (object_dist - scene_dist).abs() < self.consensus_size
    }
}

impl CorrespondenceGrouping for GeometricConsistencyGrouping {
    fn name(&self) -> &'static str {
        "geometric_consistency"
    }

    fn recognize(&self, input: &GroupingInput<'_>) -> Result<Vec<PoseHypothesis>> {
        let groups = self.cluster_correspondences(input)?;
        Ok(hypotheses_from_groups(input, groups, &self.hypothesis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_core::{rigid_from_axis_angle, rotation_error_deg, translation_error, PointCloud};
    use nalgebra::{Point3, Vector3};

    fn object_points() -> Vec<Point3<f32>> {
        (0..12)
            .map(|i| Point3::new((i % 4) as f32 * 0.03, (i / 4) as f32 * 0.04, ((i * 7) % 5) as f32 * 0.02))
            .collect()
    }

    #[test]
    fn test_rigid_copy_with_outliers() {
        let object = PointCloud::new(object_points());
        let truth = rigid_from_axis_angle(&Vector3::z(), 0.8, &Vector3::new(0.2, 0.1, 0.6));
        let mut scene_points: Vec<_> = object.points.iter().map(|p| truth.transform_point(p)).collect();
        // Two wrong matches far off
        scene_points.push(Point3::new(3.0, 3.0, 3.0));
        scene_points.push(Point3::new(-2.0, 1.0, 4.0));
        let scene = PointCloud::new(scene_points);

        let mut corrs: Vec<_> = (0..12).map(|i| Correspondence::new(i, i, 0.05)).collect();
        corrs.push(Correspondence::new(0, 12, 0.01));
        corrs.push(Correspondence::new(5, 13, 0.02));

        let input = GroupingInput {
            object: &object,
            scene: &scene,
            object_frames: &[],
            scene_frames: &[],
            correspondences: &corrs,
        };
        let grouping = GeometricConsistencyGrouping::new(0.01, 5);
        let groups = grouping.cluster_correspondences(&input).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 12);
        assert!(groups[0].iter().all(|c| c.scene_index < 12));

        let hyps = grouping.recognize(&input).unwrap();
        assert_eq!(hyps.len(), 1);
        assert!(rotation_error_deg(&hyps[0].transform, &truth) < 0.1);
        assert!(translation_error(&hyps[0].transform, &truth) < 1e-3);
    }

    #[test]
    fn test_small_groups_are_dropped() {
        let object = PointCloud::new(object_points());
        let corrs: Vec<_> = (0..5).map(|i| Correspondence::new(i, i, 0.0)).collect();
        let input = GroupingInput {
            object: &object,
            scene: &object,
            object_frames: &[],
            scene_frames: &[],
            correspondences: &corrs,
        };
        // Five consistent matches do not exceed a threshold of 5
        assert!(GeometricConsistencyGrouping::new(0.01, 5).recognize(&input).unwrap().is_empty());
        assert_eq!(GeometricConsistencyGrouping::new(0.01, 4).recognize(&input).unwrap().len(), 1);
    }

    #[test]
    fn test_out_of_range_is_an_error() {
        let object = PointCloud::new(object_points());
        let corrs = vec![Correspondence::new(0, 99, 0.0)];
        let input = GroupingInput {
            object: &object,
            scene: &object,
            object_frames: &[],
            scene_frames: &[],
            correspondences: &corrs,
        };
        assert!(GeometricConsistencyGrouping::default().recognize(&input).is_err());
    }
}
