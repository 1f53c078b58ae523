use crate::align::{refine_pose, Alignment};
use crate::config::EstimatorConfig;
use crate::matching::{DescribedCloud, FeatureMatcher};
use crate::preprocess::preprocess;
use crate::segment::segment_scene;
use crate::verify::{build_verifier, verify};
use cv_core::{PointCloud, Result, Transform};
use cv_registration::{CorrespondenceGrouping, ICPResult, PoseHypothesis};

/// Outcome of matching and verifying one scene cluster.
#[derive(Debug, Clone)]
pub struct ClusterEvaluation {
    /// Position of the cluster in the segmentation output.
    pub cluster_index: usize,
    pub cluster_size: usize,
    /// Raw correspondence count, the cluster's recognition score.
    pub num_correspondences: usize,
    pub hypotheses: Vec<PoseHypothesis>,
}

impl ClusterEvaluation {
    pub fn is_verified(&self) -> bool {
        !self.hypotheses.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotFoundReason {
    /// Nothing but the dominant plane (or nothing at all) was in the scene.
    NoClusters,
    /// No cluster had a single descriptor match.
    NoCorrespondences,
    /// Matches existed but none formed a consistent group.
    NoVerifiedGroups,
}

impl std::fmt::Display for NotFoundReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            NotFoundReason::NoClusters => "no clusters after segmentation",
            NotFoundReason::NoCorrespondences => "no descriptor correspondences",
            NotFoundReason::NoVerifiedGroups => "no geometrically consistent correspondence group",
        };
        f.write_str(text)
    }
}

/// A recognized object pose.
#[derive(Debug, Clone)]
pub struct PoseEstimate {
    /// Pose from correspondence grouping alone.
    pub coarse: Transform,
    /// ICP correction applied on top of `coarse`.
    pub refinement: Transform,
    /// `refinement * coarse`, mapping object coordinates into the scene.
    pub combined: Transform,
    pub cluster_index: usize,
    pub cluster: PointCloud,
    /// The hypothesis `coarse` came from, with its supporting group.
    pub hypothesis: PoseHypothesis,
    pub icp: ICPResult,
    pub evaluations: Vec<ClusterEvaluation>,
}

#[derive(Debug, Clone)]
pub enum Recognition {
    Found(Box<PoseEstimate>),
    NotFound {
        reason: NotFoundReason,
        evaluations: Vec<ClusterEvaluation>,
    },
}

impl Recognition {
    pub fn is_found(&self) -> bool {
        matches!(self, Recognition::Found(_))
    }

    pub fn pose(&self) -> Option<&PoseEstimate> {
        match self {
            Recognition::Found(estimate) => Some(estimate),
            Recognition::NotFound { .. } => None,
        }
    }

    pub fn evaluations(&self) -> &[ClusterEvaluation] {
        match self {
            Recognition::Found(estimate) => &estimate.evaluations,
            Recognition::NotFound { evaluations, .. } => evaluations,
        }
    }
}

/// Index of the cluster with the most raw correspondences among those with at
/// least one verified hypothesis. Earlier clusters win ties.
pub fn select_best_cluster(evaluations: &[ClusterEvaluation]) -> Option<usize> {
    let mut best: Option<&ClusterEvaluation> = None;
    for evaluation in evaluations.iter().filter(|e| e.is_verified()) {
        if best.map_or(true, |b| evaluation.num_correspondences > b.num_correspondences) {
            best = Some(evaluation);
        }
    }
    best.map(|e| e.cluster_index)
}

/// The hypothesis backed by the largest correspondence group; the first one
/// on ties.
pub fn select_hypothesis(hypotheses: &[PoseHypothesis]) -> Option<&PoseHypothesis> {
    let mut best: Option<&PoseHypothesis> = None;
    for h in hypotheses {
        if best.map_or(true, |b| h.correspondences.len() > b.correspondences.len()) {
            best = Some(h);
        }
    }
    best
}

/// Recognition and pose estimation of a known object in a scene.
///
/// Stages run strictly in order: preprocessing, plane removal and
/// clustering, per-cluster description and matching, correspondence
/// grouping, best-cluster selection and ICP refinement.
pub struct PoseEstimator {
    config: EstimatorConfig,
    matcher: FeatureMatcher,
    verifier: Box<dyn CorrespondenceGrouping>,
}

impl PoseEstimator {
    pub fn new(config: EstimatorConfig) -> Self {
        let matcher = FeatureMatcher::new(&config.features, &config.preprocess);
        let verifier = build_verifier(&config.verification);
        Self {
            config,
            matcher,
            verifier,
        }
    }

    pub fn config(&self) -> &EstimatorConfig {
        &self.config
    }

    /// Locate `object` in `scene`.
    ///
    /// Returns an error when the object has no usable points or a stage is
    /// handed malformed data; a scene in which the object cannot be found is
    /// reported as [`Recognition::NotFound`].
    pub fn estimate(&self, object: &PointCloud, scene: &PointCloud) -> Result<Recognition> {
        let prepared = preprocess(object, scene, &self.config.preprocess)?;
        let segmented = segment_scene(&prepared.scene, &self.config.segmentation);
        if segmented.clusters.is_empty() {
            return Ok(Recognition::NotFound {
                reason: NotFoundReason::NoClusters,
                evaluations: Vec::new(),
            });
        }

        let object_features = self.matcher.describe(&prepared.object)?;
        tracing::debug!(
            points = object_features.cloud.len(),
            valid_descriptors = object_features.valid_descriptors(),
            "object features"
        );

        let mut evaluations = Vec::with_capacity(segmented.clusters.len());
        let mut described_clusters = Vec::with_capacity(segmented.clusters.len());
        for (cluster_index, cluster) in segmented.clusters.iter().enumerate() {
            let (evaluation, described) = self.evaluate_cluster(cluster_index, &cluster.cloud, &object_features)?;
            evaluations.push(evaluation);
            described_clusters.push(described);
        }

        let Some(best) = select_best_cluster(&evaluations) else {
            let reason = if evaluations.iter().all(|e| e.num_correspondences == 0) {
                NotFoundReason::NoCorrespondences
            } else {
                NotFoundReason::NoVerifiedGroups
            };
            tracing::warn!(%reason, clusters = evaluations.len(), "object not recognized");
            return Ok(Recognition::NotFound { reason, evaluations });
        };

        let Some(hypothesis) = select_hypothesis(&evaluations[best].hypotheses).cloned() else {
            return Ok(Recognition::NotFound {
                reason: NotFoundReason::NoVerifiedGroups,
                evaluations,
            });
        };
        tracing::info!(
            cluster = best,
            correspondences = evaluations[best].num_correspondences,
            group = hypothesis.correspondences.len(),
            "recognized"
        );

        let cluster = described_clusters.swap_remove(best).cloud;
        let Alignment {
            coarse,
            refinement,
            combined,
        } = refine_pose(&prepared.object, &cluster, &hypothesis.transform, &self.config.icp)?;

        Ok(Recognition::Found(Box::new(PoseEstimate {
            coarse,
            refinement: refinement.transformation,
            combined,
            cluster_index: best,
            cluster,
            hypothesis,
            icp: refinement,
            evaluations,
        })))
    }

    fn evaluate_cluster(
        &self,
        cluster_index: usize,
        cluster: &PointCloud,
        object: &DescribedCloud,
    ) -> Result<(ClusterEvaluation, DescribedCloud)> {
        let described = self.matcher.describe_cluster(cluster)?;
        let correspondences = self.matcher.match_features(object, &described);
        let hypotheses = verify(self.verifier.as_ref(), object, &described, &correspondences)?;

        tracing::debug!(
            cluster = cluster_index,
            points = cluster.len(),
            correspondences = correspondences.len(),
            hypotheses = hypotheses.len(),
            "cluster evaluated"
        );

        let evaluation = ClusterEvaluation {
            cluster_index,
            cluster_size: cluster.len(),
            num_correspondences: correspondences.len(),
            hypotheses,
        };
        Ok((evaluation, described))
    }
}
