//! Local surface features for 3D object recognition.
//!
//! - [`reference_frame`]: BOARD local reference frames
//! - [`shot`]: SHOT 352-bin shape descriptors
//! - [`correspondence`]: nearest-neighbour descriptor matching

pub mod correspondence;
pub mod reference_frame;
pub mod shot;

pub use correspondence::{find_correspondences, Correspondence, Matcher};
pub use reference_frame::{BoardEstimator, ReferenceFrame};
pub use shot::{ShotDescriptor, ShotEstimator, SHOT_DESCRIPTOR_LEN};

pub type Result<T> = std::result::Result<T, FeatureError>;

#[derive(Debug, thiserror::Error)]
pub enum FeatureError {
    #[error("Descriptor error: {0}")]
    DescriptorError(String),

    #[error("Reference frame error: {0}")]
    ReferenceFrameError(String),
}

impl From<FeatureError> for cv_core::Error {
    fn from(err: FeatureError) -> Self {
        cv_core::Error::InvalidInput(err.to_string())
    }
}
