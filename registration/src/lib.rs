//! Point cloud registration algorithms
//!
//! This crate turns descriptor correspondences into object poses:
//! - Correspondence grouping (Hough 3D voting, geometric consistency), each
//!   group yielding one rigid pose hypothesis
//! - ICP (Iterative Closest Point) point-to-point refinement

pub mod grouping;
pub mod icp;

pub use grouping::{
    estimate_hypothesis, CorrespondenceGrouping, GeometricConsistencyGrouping, GroupingInput,
    Hough3DGrouping, HypothesisConfig, PoseHypothesis,
};
pub use icp::{registration_icp_point_to_point, ICPCriteria, ICPResult};
pub use cv_core::{Error, Result};
