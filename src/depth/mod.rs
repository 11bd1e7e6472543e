//! Monocular depth estimation.

mod backend;
pub mod backends;
mod estimator;
mod map;

pub use backend::DepthBackend;
pub use estimator::DepthEstimator;
pub use map::{DepthBuffer, DepthMap};
