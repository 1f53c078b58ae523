//! Rigid object pose estimation in cluttered point cloud scenes.
//!
//! Facade over the `cv-*` crates; see [`recognition::PoseEstimator`] for the
//! full pipeline.

pub use cv_core as core;
pub use cv_features as features;
pub use cv_io as io;
pub use cv_point_cloud as point_cloud;
pub use cv_recognition as recognition;
pub use cv_registration as registration;

pub use cv_recognition::{EstimatorConfig, PoseEstimate, PoseEstimator, Recognition};

/// Initialize a single global Rayon thread pool for all CPU-parallel routines.
///
/// Call this once at application startup before running the pipeline.
/// Repeated calls are idempotent and return the first initialization result.
///
/// Priority order:
/// 1. explicit `num_threads`
/// 2. `RUSTCV_CPU_THREADS` env var
/// 3. Rayon default
pub fn init_thread_pool(num_threads: Option<usize>) -> cv_core::Result<()> {
    cv_core::init_global_thread_pool(num_threads)
}
