use image::RgbImage;

use crate::depth::backend::DepthBackend;
use crate::depth::map::DepthMap;
use crate::error::{PipelineError, PipelineResult};

/// Output resolution of the stub, to exercise resampling like a real model.
const STUB_RESOLUTION: u32 = 64;

/// Stub depth backend: a vertical ramp, larger values nearer the bottom edge
/// (closer to the camera, as in inverse-depth model output).
pub struct StubDepthBackend;

impl DepthBackend for StubDepthBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn estimate(&mut self, _image: &RgbImage) -> PipelineResult<DepthMap> {
        let scale = STUB_RESOLUTION as f32;
        Ok(DepthMap::from_fn(STUB_RESOLUTION, STUB_RESOLUTION, |_, y| {
            (y as f32 + 1.0) / scale * 10.0
        }))
    }
}

/// Backend that always fails; exercises the zero-map fallback.
pub struct FailingDepthBackend;

impl DepthBackend for FailingDepthBackend {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn estimate(&mut self, _image: &RgbImage) -> PipelineResult<DepthMap> {
        Err(PipelineError::DepthEstimation(
            "stub depth backend configured to fail".into(),
        ))
    }
}
