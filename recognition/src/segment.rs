use crate::config::SegmentationConfig;
use cv_core::PointCloud;
use cv_point_cloud::{cluster_euclidean, segment_plane, Cluster, PlaneSegmentation};

/// Scene split into the removed plane and the object candidates.
#[derive(Debug, Clone)]
pub struct Segmented {
    pub plane: PlaneSegmentation,
    /// Disjoint clusters of the plane-free scene, largest first.
    pub clusters: Vec<Cluster>,
}

/// Remove the dominant plane, then cluster what is left.
///
/// Zero clusters is a valid outcome.
pub fn segment_scene(scene: &PointCloud, config: &SegmentationConfig) -> Segmented {
    let plane = segment_plane(
        scene,
        config.plane_distance_threshold,
        config.plane_max_iterations,
        config.seed,
    );
    let remaining = plane.remaining(scene);
    let clusters = cluster_euclidean(
        &remaining,
        config.cluster_tolerance,
        config.min_cluster_size,
        config.max_cluster_size,
    );

    tracing::info!(
        plane_inliers = plane.inliers.len(),
        remaining = remaining.len(),
        clusters = clusters.len(),
        "segmentation"
    );
    if clusters.is_empty() {
        tracing::warn!("no clusters left after plane removal");
    }

    Segmented { plane, clusters }
}
