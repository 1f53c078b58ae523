pub mod error;
pub mod geometry;
pub mod point_cloud;
pub mod robust;
pub mod runtime;

pub use error::{Error, Result};
pub use geometry::*;
pub use point_cloud::*;
pub use robust::*;
pub use runtime::{current_cpu_threads, init_global_thread_pool};
