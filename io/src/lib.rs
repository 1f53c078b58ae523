//! Point cloud file I/O
//!
//! Supports reading point clouds in PCD (Point Cloud Data - PCL format),
//! ASCII and uncompressed binary encodings.

pub mod pcd;

pub use pcd::{read_pcd, read_pcd_file, PcdData, PcdHeader};

pub use cv_core::{Error, Result};
