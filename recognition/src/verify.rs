use crate::config::{GroupingMethod, VerificationConfig};
use crate::matching::DescribedCloud;
use cv_core::Result;
use cv_features::Correspondence;
use cv_registration::{
    CorrespondenceGrouping, GeometricConsistencyGrouping, GroupingInput, Hough3DGrouping, HypothesisConfig,
    PoseHypothesis,
};

/// The configured grouping strategy.
pub fn build_verifier(config: &VerificationConfig) -> Box<dyn CorrespondenceGrouping> {
    let hypothesis = HypothesisConfig {
        inlier_threshold: config.bin_size,
        max_iterations: config.hypothesis_iterations,
        seed: config.seed,
    };
    match config.method {
        GroupingMethod::Hough3d => Box::new(
            Hough3DGrouping::new(config.bin_size, config.threshold)
                .with_interpolation(config.use_interpolation)
                .with_distance_weight(config.use_distance_weight)
                .with_hypothesis_config(hypothesis),
        ),
        GroupingMethod::GeometricConsistency => Box::new(
            GeometricConsistencyGrouping::new(config.bin_size, config.threshold.max(0.0) as usize)
                .with_hypothesis_config(hypothesis),
        ),
    }
}

/// Verified pose hypotheses for one object/cluster pair.
pub fn verify(
    verifier: &dyn CorrespondenceGrouping,
    object: &DescribedCloud,
    scene: &DescribedCloud,
    correspondences: &[Correspondence],
) -> Result<Vec<PoseHypothesis>> {
    if correspondences.is_empty() {
        return Ok(Vec::new());
    }
    let input = GroupingInput {
        object: &object.cloud,
        scene: &scene.cloud,
        object_frames: &object.frames,
        scene_frames: &scene.frames,
        correspondences,
    };
    let hypotheses = verifier.recognize(&input)?;
    tracing::debug!(
        method = verifier.name(),
        correspondences = correspondences.len(),
        hypotheses = hypotheses.len(),
        "verification"
    );
    Ok(hypotheses)
}
