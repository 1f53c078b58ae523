//! Object recognition in cluttered point cloud scenes
//!
//! Estimates the rigid pose of a known object inside a scene:
//! - [`preprocess`]: z-range clipping, voxel downsampling, object normals
//! - [`segment`]: dominant plane removal and Euclidean clustering
//! - [`matching`]: BOARD frames, SHOT descriptors and descriptor matching
//! - [`verify`]: correspondence grouping into pose hypotheses
//! - [`align`]: ICP refinement of the coarse pose
//!
//! [`PoseEstimator`] runs the stages in order and selects the best cluster.

pub mod align;
pub mod config;
pub mod estimator;
pub mod matching;
pub mod preprocess;
pub mod segment;
pub mod verify;

pub use align::{refine_pose, Alignment};
pub use config::{
    EstimatorConfig, FeatureConfig, GroupingMethod, IcpConfig, PreprocessConfig, SegmentationConfig,
    VerificationConfig,
};
pub use estimator::{
    select_best_cluster, select_hypothesis, ClusterEvaluation, NotFoundReason, PoseEstimate, PoseEstimator,
    Recognition,
};
pub use matching::{DescribedCloud, FeatureMatcher};
pub use preprocess::{filter_cloud, preprocess, Preprocessed};
pub use segment::{segment_scene, Segmented};
pub use verify::{build_verifier, verify};

pub use cv_core::{Error, Result};
