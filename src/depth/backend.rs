use image::RgbImage;

use crate::depth::map::DepthMap;
use crate::error::PipelineResult;

/// Monocular depth backend.
///
/// Returns a relative depth map at whatever resolution the model produces;
/// `DepthEstimator` resamples it to the frame.
pub trait DepthBackend: Send {
    fn name(&self) -> &'static str;

    fn estimate(&mut self, image: &RgbImage) -> PipelineResult<DepthMap>;
}
