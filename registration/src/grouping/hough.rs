use super::{hypotheses_from_groups, CorrespondenceGrouping, GroupingInput, HypothesisConfig, PoseHypothesis};
use cv_core::{Error, Result};
use cv_features::Correspondence;
use nalgebra::{Point3, Vector3};
use std::collections::HashMap;

type BinKey = (i64, i64, i64);

/// Hough voting in 3D over the object reference point.
///
/// Each correspondence carries the offset from its object point to the
/// object centroid, expressed in the object point's local reference frame.
/// Re-expressing that offset in the scene point's frame predicts where the
/// object centroid sits in the scene; consistent correspondences pile their
/// predictions into the same bin. Local maxima at or above the threshold
/// become groups.
#[derive(Debug, Clone)]
pub struct Hough3DGrouping {
    bin_size: f32,
    threshold: f64,
    use_interpolation: bool,
    use_distance_weight: bool,
    hypothesis: HypothesisConfig,
}

impl Default for Hough3DGrouping {
    fn default() -> Self {
        Self {
            bin_size: 0.01,
            threshold: 5.0,
            use_interpolation: true,
            use_distance_weight: false,
            hypothesis: HypothesisConfig::default(),
        }
    }
}

impl Hough3DGrouping {
    pub fn new(bin_size: f32, threshold: f64) -> Self {
        Self {
            bin_size,
            threshold,
            hypothesis: HypothesisConfig {
                inlier_threshold: bin_size,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Spread each vote trilinearly over the 8 bins around it.
    pub fn with_interpolation(mut self, enabled: bool) -> Self {
        self.use_interpolation = enabled;
        self
    }

    /// Weight votes by the inverse descriptor distance.
    pub fn with_distance_weight(mut self, enabled: bool) -> Self {
        self.use_distance_weight = enabled;
        self
    }

    pub fn with_hypothesis_config(mut self, config: HypothesisConfig) -> Self {
        self.hypothesis = config;
        self
    }

    fn bin_of(&self, p: &Point3<f32>) -> BinKey {
        (
            (p.x / self.bin_size).floor() as i64,
            (p.y / self.bin_size).floor() as i64,
            (p.z / self.bin_size).floor() as i64,
        )
    }

    /// Predicted scene position of the object centroid for every usable
    /// correspondence, as `(correspondence index, vote)`.
    fn cast_votes(&self, input: &GroupingInput<'_>) -> Result<Vec<(usize, Point3<f32>)>> {
        let centroid = input
            .object
            .centroid()
            .ok_or_else(|| Error::EmptyCloud("Hough grouping needs object points".to_string()))?;

        let mut votes = Vec::with_capacity(input.correspondences.len());
        for (i, c) in input.correspondences.iter().enumerate() {
            if c.object_index >= input.object.len() || c.scene_index >= input.scene.len() {
                return Err(Error::InvalidInput(format!(
                    "Correspondence ({}, {}) is out of range",
                    c.object_index, c.scene_index
                )));
            }
            let (Some(object_frame), Some(scene_frame)) = (
                input.object_frames.get(c.object_index),
                input.scene_frames.get(c.scene_index),
            ) else {
                return Err(Error::InvalidInput(format!(
                    "Correspondence {i} refers to a point without a reference frame"
                )));
            };
            if !object_frame.is_finite() || !scene_frame.is_finite() {
                continue;
            }

            let local: Vector3<f32> = object_frame.to_local() * (centroid - input.object.points[c.object_index]);
            let offset = scene_frame.to_local().transpose() * local;
            let vote = input.scene.points[c.scene_index] + offset;
            if vote.iter().all(|v| v.is_finite()) {
                votes.push((i, vote));
            }
        }
        Ok(votes)
    }

    /// Correspondence groups, one per accepted maximum, strongest first.
    pub fn cluster_correspondences(&self, input: &GroupingInput<'_>) -> Result<Vec<Vec<Correspondence>>> {
        if self.bin_size.is_nan() || self.bin_size <= 0.0 {
            return Err(Error::InvalidInput(format!(
                "Hough bin size must be positive, got {}",
                self.bin_size
            )));
        }

        let votes = self.cast_votes(input)?;
        let mut space: HashMap<BinKey, f64> = HashMap::new();
        let mut voters: HashMap<BinKey, Vec<usize>> = HashMap::new();

        for &(i, vote) in &votes {
            let weight = if self.use_distance_weight {
                1.0 / (input.correspondences[i].distance as f64).max(1e-6)
            } else {
                1.0
            };

            let key = self.bin_of(&vote);
            voters.entry(key).or_default().push(i);

            if self.use_interpolation {
                // Continuous position relative to bin centres
                let g = vote.coords / self.bin_size - Vector3::repeat(0.5);
                let base = (g.x.floor() as i64, g.y.floor() as i64, g.z.floor() as i64);
                let f = Vector3::new(
                    (g.x - g.x.floor()) as f64,
                    (g.y - g.y.floor()) as f64,
                    (g.z - g.z.floor()) as f64,
                );
                for dx in 0..2i64 {
                    for dy in 0..2i64 {
                        for dz in 0..2i64 {
                            let wx = if dx == 0 { 1.0 - f.x } else { f.x };
                            let wy = if dy == 0 { 1.0 - f.y } else { f.y };
                            let wz = if dz == 0 { 1.0 - f.z } else { f.z };
                            let w = wx * wy * wz * weight;
                            if w > 0.0 {
                                *space.entry((base.0 + dx, base.1 + dy, base.2 + dz)).or_default() += w;
                            }
                        }
                    }
                }
            } else {
                *space.entry(key).or_default() += weight;
            }
        }

        let maxima = local_maxima(&space, &voters, self.threshold);
        let groups: Vec<Vec<Correspondence>> = maxima
            .iter()
            .map(|(key, _)| {
                let mut ids = voters[key].clone();
                ids.sort_unstable();
                ids.into_iter().map(|i| input.correspondences[i]).collect()
            })
            .collect();

        tracing::debug!(
            votes = votes.len(),
            bins = space.len(),
            maxima = groups.len(),
            "hough voting"
        );
        Ok(groups)
    }
}

/// Bins with voters of their own that reach `threshold` and beat their
/// 26 neighbours, strongest first. Among equal neighbouring candidates only
/// the smallest key survives.
fn local_maxima(
    space: &HashMap<BinKey, f64>,
    voters: &HashMap<BinKey, Vec<usize>>,
    threshold: f64,
) -> Vec<(BinKey, f64)> {
    let mut maxima: Vec<(BinKey, f64)> = voters
        .keys()
        .filter_map(|key| {
            let value = space.get(key).copied().unwrap_or(0.0);
            if value < threshold {
                return None;
            }
            for dx in -1..=1i64 {
                for dy in -1..=1i64 {
                    for dz in -1..=1i64 {
                        if (dx, dy, dz) == (0, 0, 0) {
                            continue;
                        }
                        let neighbor = (key.0 + dx, key.1 + dy, key.2 + dz);
                        let other = space.get(&neighbor).copied().unwrap_or(0.0);
                        if other > value || (other == value && neighbor < *key && voters.contains_key(&neighbor)) {
                            return None;
                        }
                    }
                }
            }
            Some((*key, value))
        })
        .collect();
    maxima.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    maxima
}

impl CorrespondenceGrouping for Hough3DGrouping {
    fn name(&self) -> &'static str {
        "hough3d"
    }

    fn recognize(&self, input: &GroupingInput<'_>) -> Result<Vec<PoseHypothesis>> {
        let groups = self.cluster_correspondences(input)?;
        Ok(hypotheses_from_groups(input, groups, &self.hypothesis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cv_core::PointCloud;
    use cv_features::ReferenceFrame;

    fn identity_frames(n: usize) -> Vec<ReferenceFrame> {
        (0..n).map(|_| ReferenceFrame::new(Vector3::x(), Vector3::z())).collect()
    }

    fn object_points() -> Vec<Point3<f32>> {
        (0..10)
            .map(|i| Point3::new((i % 5) as f32 * 0.01, (i / 5) as f32 * 0.02, (i % 3) as f32 * 0.01))
            .collect()
    }

    #[test]
    fn test_translated_copy_forms_one_group() {
        let object = PointCloud::new(object_points());
        // Object centroid is (0.02, 0.01, 0.009); the vote lands mid-bin
        let shift = Vector3::new(0.305, -0.095, 0.496);
        let scene = PointCloud::new(object.points.iter().map(|p| p + shift).collect());
        let frames = identity_frames(10);
        let corrs: Vec<_> = (0..10).map(|i| Correspondence::new(i, i, 0.01)).collect();

        let input = GroupingInput {
            object: &object,
            scene: &scene,
            object_frames: &frames,
            scene_frames: &frames,
            correspondences: &corrs,
        };
        let grouping = Hough3DGrouping::new(0.01, 5.0);
        let groups = grouping.cluster_correspondences(&input).unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].len(), 10);

        let hyps = grouping.recognize(&input).unwrap();
        assert_eq!(hyps.len(), 1);
        let t = cv_core::translation_part(&hyps[0].transform);
        assert!((t - shift).norm() < 1e-4);
    }

    #[test]
    fn test_scattered_votes_below_threshold() {
        let object = PointCloud::new(object_points());
        let scene = PointCloud::new(
            (0..10)
                .map(|i| Point3::new(i as f32 * 0.5, (i * i) as f32 * 0.1, 0.0))
                .collect(),
        );
        let frames = identity_frames(10);
        let corrs: Vec<_> = (0..10).map(|i| Correspondence::new(i, i, 0.01)).collect();
        let input = GroupingInput {
            object: &object,
            scene: &scene,
            object_frames: &frames,
            scene_frames: &frames,
            correspondences: &corrs,
        };
        assert!(Hough3DGrouping::default().recognize(&input).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_frames_do_not_vote() {
        let object = PointCloud::new(object_points());
        let scene = object.clone();
        let mut frames = identity_frames(10);
        for f in frames.iter_mut().take(6) {
            *f = ReferenceFrame::nan();
        }
        let corrs: Vec<_> = (0..10).map(|i| Correspondence::new(i, i, 0.01)).collect();
        let input = GroupingInput {
            object: &object,
            scene: &scene,
            object_frames: &frames,
            scene_frames: &frames,
            correspondences: &corrs,
        };
        // Only 4 valid voters remain, below the threshold of 5
        assert!(Hough3DGrouping::new(0.01, 5.0).recognize(&input).unwrap().is_empty());
    }

    #[test]
    fn test_equal_neighbouring_bins_give_one_maximum() {
        let space: HashMap<BinKey, f64> = [((0, 0, 0), 6.0), ((1, 0, 0), 6.0), ((5, 5, 5), 7.0), ((5, 5, 6), 7.0)]
            .into_iter()
            .collect();
        // (5, 5, 5) ties a bin nobody voted into, so it still stands
        let voters: HashMap<BinKey, Vec<usize>> = [((0, 0, 0), vec![0]), ((1, 0, 0), vec![1]), ((5, 5, 6), vec![2])]
            .into_iter()
            .collect();

        let maxima = local_maxima(&space, &voters, 5.0);
        assert_eq!(maxima, vec![((5, 5, 6), 7.0), ((0, 0, 0), 6.0)]);
    }

    #[test]
    fn test_missing_frames_is_an_error() {
        let object = PointCloud::new(object_points());
        let corrs = vec![Correspondence::new(0, 0, 0.0)];
        let input = GroupingInput {
            object: &object,
            scene: &object,
            object_frames: &[],
            scene_frames: &[],
            correspondences: &corrs,
        };
        assert!(Hough3DGrouping::default().recognize(&input).is_err());
    }
}
