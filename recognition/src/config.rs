//! Pipeline configuration.
//!
//! Every knob has a default and can be set through the public fields, the
//! `with_*` builders, or a serialized (JSON) config where missing fields fall
//! back to their defaults.

use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// Range clipping, downsampling and normal estimation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub z_min: f32,
    pub z_max: f32,
    /// Voxel edge length for downsampling.
    pub leaf_size: f32,
    /// Neighbourhood size for normal estimation.
    pub normal_k: usize,
    /// Normals are flipped to face this point. `None` leaves them as fitted.
    pub viewpoint: Option<[f32; 3]>,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            z_min: 0.0,
            z_max: 5.0,
            leaf_size: 0.005,
            normal_k: 10,
            viewpoint: Some([0.0, 0.0, 0.0]),
        }
    }
}

impl PreprocessConfig {
    pub fn with_z_range(mut self, z_min: f32, z_max: f32) -> Self {
        self.z_min = z_min;
        self.z_max = z_max;
        self
    }

    pub fn with_leaf_size(mut self, leaf_size: f32) -> Self {
        self.leaf_size = leaf_size;
        self
    }

    pub fn with_normal_k(mut self, k: usize) -> Self {
        self.normal_k = k;
        self
    }

    pub fn with_viewpoint(mut self, viewpoint: Option<[f32; 3]>) -> Self {
        self.viewpoint = viewpoint;
        self
    }

    pub fn viewpoint_point(&self) -> Option<Point3<f32>> {
        self.viewpoint.map(|[x, y, z]| Point3::new(x, y, z))
    }
}

/// Dominant plane removal and Euclidean clustering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    pub plane_max_iterations: usize,
    pub plane_distance_threshold: f32,
    pub cluster_tolerance: f32,
    pub min_cluster_size: usize,
    pub max_cluster_size: usize,
    /// RANSAC seed. `None` seeds from entropy.
    pub seed: Option<u64>,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            plane_max_iterations: 100,
            plane_distance_threshold: 0.02,
            cluster_tolerance: 0.02,
            min_cluster_size: 10,
            max_cluster_size: 45000,
            seed: Some(42),
        }
    }
}

impl SegmentationConfig {
    pub fn with_plane(mut self, max_iterations: usize, distance_threshold: f32) -> Self {
        self.plane_max_iterations = max_iterations;
        self.plane_distance_threshold = distance_threshold;
        self
    }

    pub fn with_cluster_tolerance(mut self, tolerance: f32) -> Self {
        self.cluster_tolerance = tolerance;
        self
    }

    pub fn with_cluster_size(mut self, min_size: usize, max_size: usize) -> Self {
        self.min_cluster_size = min_size;
        self.max_cluster_size = max_size;
        self
    }

    pub fn with_seed(mut self, seed: Option<u64>) -> Self {
        self.seed = seed;
        self
    }
}

/// Reference frames, descriptors and descriptor matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    pub reference_frame_radius: f32,
    pub find_holes: bool,
    pub descriptor_radius: f32,
    /// Matches must have a squared descriptor distance below this.
    pub max_descriptor_distance: f32,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            reference_frame_radius: 0.015,
            find_holes: true,
            descriptor_radius: 0.02,
            max_descriptor_distance: 0.25,
        }
    }
}

impl FeatureConfig {
    pub fn with_reference_frame_radius(mut self, radius: f32) -> Self {
        self.reference_frame_radius = radius;
        self
    }

    pub fn with_find_holes(mut self, find_holes: bool) -> Self {
        self.find_holes = find_holes;
        self
    }

    pub fn with_descriptor_radius(mut self, radius: f32) -> Self {
        self.descriptor_radius = radius;
        self
    }

    pub fn with_max_descriptor_distance(mut self, distance: f32) -> Self {
        self.max_descriptor_distance = distance;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupingMethod {
    #[default]
    Hough3d,
    GeometricConsistency,
}

/// Correspondence grouping and hypothesis fitting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    pub method: GroupingMethod,
    /// Hough bin edge, or the consensus size for geometric consistency.
    pub bin_size: f32,
    /// Minimum votes for a Hough bin; geometric consistency groups must be
    /// strictly larger than this.
    pub threshold: f64,
    pub use_interpolation: bool,
    pub use_distance_weight: bool,
    pub hypothesis_iterations: usize,
    pub seed: Option<u64>,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            method: GroupingMethod::Hough3d,
            bin_size: 0.01,
            threshold: 5.0,
            use_interpolation: true,
            use_distance_weight: false,
            hypothesis_iterations: 10000,
            seed: Some(42),
        }
    }
}

impl VerificationConfig {
    pub fn with_method(mut self, method: GroupingMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_bin_size(mut self, bin_size: f32) -> Self {
        self.bin_size = bin_size;
        self
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_interpolation(mut self, enabled: bool) -> Self {
        self.use_interpolation = enabled;
        self
    }

    pub fn with_distance_weight(mut self, enabled: bool) -> Self {
        self.use_distance_weight = enabled;
        self
    }
}

/// ICP refinement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IcpConfig {
    pub max_iterations: usize,
    pub transformation_epsilon: f64,
    pub fitness_epsilon: f64,
    /// `None` pairs every source point with its nearest target point.
    pub max_correspondence_distance: Option<f32>,
}

impl Default for IcpConfig {
    fn default() -> Self {
        Self {
            max_iterations: 5000,
            transformation_epsilon: 1e-10,
            fitness_epsilon: 1e-12,
            max_correspondence_distance: None,
        }
    }
}

impl IcpConfig {
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_max_correspondence_distance(mut self, distance: Option<f32>) -> Self {
        self.max_correspondence_distance = distance;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    pub preprocess: PreprocessConfig,
    pub segmentation: SegmentationConfig,
    pub features: FeatureConfig,
    pub verification: VerificationConfig,
    pub icp: IcpConfig,
}

impl EstimatorConfig {
    pub fn with_preprocess(mut self, config: PreprocessConfig) -> Self {
        self.preprocess = config;
        self
    }

    pub fn with_segmentation(mut self, config: SegmentationConfig) -> Self {
        self.segmentation = config;
        self
    }

    pub fn with_features(mut self, config: FeatureConfig) -> Self {
        self.features = config;
        self
    }

    pub fn with_verification(mut self, config: VerificationConfig) -> Self {
        self.verification = config;
        self
    }

    pub fn with_icp(mut self, config: IcpConfig) -> Self {
        self.icp = config;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EstimatorConfig::default();
        assert_eq!(config.preprocess.z_max, 5.0);
        assert_eq!(config.preprocess.leaf_size, 0.005);
        assert_eq!(config.segmentation.plane_max_iterations, 100);
        assert_eq!(config.segmentation.max_cluster_size, 45000);
        assert_eq!(config.features.reference_frame_radius, 0.015);
        assert_eq!(config.verification.method, GroupingMethod::Hough3d);
        assert_eq!(config.icp.max_iterations, 5000);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let json = r#"{
            "preprocess": { "leaf_size": 0.01 },
            "verification": { "method": "geometric_consistency" }
        }"#;
        let config: EstimatorConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.preprocess.leaf_size, 0.01);
        assert_eq!(config.preprocess.normal_k, 10);
        assert_eq!(config.verification.method, GroupingMethod::GeometricConsistency);
        assert_eq!(config.verification.bin_size, 0.01);
        assert_eq!(config.icp, IcpConfig::default());
    }

    #[test]
    fn test_builders() {
        let config = EstimatorConfig::default()
            .with_preprocess(PreprocessConfig::default().with_viewpoint(None))
            .with_icp(IcpConfig::default().with_max_iterations(10));
        assert!(config.preprocess.viewpoint_point().is_none());
        assert_eq!(config.icp.max_iterations, 10);
    }
}
