use crate::config::PreprocessConfig;
use cv_core::{Error, PointCloud, Result};
use cv_point_cloud::{pass_through, voxel_down_sample, with_estimated_normals, FilterAxis};

/// Preprocessed object (with normals) and scene.
#[derive(Debug, Clone)]
pub struct Preprocessed {
    pub object: PointCloud,
    pub scene: PointCloud,
}

/// Clip to the configured z range, then voxel-downsample.
pub fn filter_cloud(cloud: &PointCloud, config: &PreprocessConfig) -> Result<PointCloud> {
    let clipped = pass_through(cloud, FilterAxis::Z, config.z_min, config.z_max);
    voxel_down_sample(&clipped, config.leaf_size)
}

/// Filter both clouds and estimate object normals.
///
/// An object with no points left after filtering is an error; an empty
/// scene is passed on and later reported as having no clusters.
pub fn preprocess(object: &PointCloud, scene: &PointCloud, config: &PreprocessConfig) -> Result<Preprocessed> {
    let object_filtered = filter_cloud(object, config)?;
    if object_filtered.is_empty() {
        return Err(Error::EmptyCloud(format!(
            "object has no points with z in [{}, {}]",
            config.z_min, config.z_max
        )));
    }
    let viewpoint = config.viewpoint_point();
    let object_with_normals = with_estimated_normals(&object_filtered, config.normal_k, viewpoint.as_ref());

    let scene_filtered = filter_cloud(scene, config)?;

    tracing::info!(
        object_in = object.len(),
        object_out = object_with_normals.len(),
        scene_in = scene.len(),
        scene_out = scene_filtered.len(),
        "preprocessing"
    );

    Ok(Preprocessed {
        object: object_with_normals,
        scene: scene_filtered,
    })
}
