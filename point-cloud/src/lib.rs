//! Point Cloud Operations
//!
//! CPU point cloud processing used by the recognition pipeline:
//!
//! - [`search`]: rstar-backed spatial index (k-nearest and radius queries)
//! - [`filtering`]: pass-through range filtering and voxel-grid downsampling
//! - [`normals`]: PCA normal estimation on k-nearest neighbourhoods
//! - [`segmentation`]: RANSAC plane segmentation and Euclidean clustering
//! - [`synthetic`]: deterministic surface samplers for tests and demos

pub mod filtering;
pub mod normals;
pub mod search;
pub mod segmentation;
pub mod synthetic;

pub use filtering::{pass_through, voxel_down_sample, FilterAxis};
pub use normals::{estimate_normals, with_estimated_normals};
pub use search::SpatialIndex;
pub use segmentation::{
    cluster_euclidean, extract_euclidean_clusters, segment_plane, Cluster, PlaneEstimator,
    PlaneSegmentation,
};

pub use cv_core::{Error, PointCloud, Result};
