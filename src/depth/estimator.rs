use crate::config::ModelArtifact;
use crate::depth::backend::DepthBackend;
use crate::depth::backends::load_backend;
use crate::depth::map::DepthMap;
use crate::error::PipelineResult;
use crate::frame::Frame;

/// Depth estimator. `estimate` never fails: a backend error is logged and
/// replaced by an all-zero map so the frame can still be processed.
pub struct DepthEstimator {
    backend: Box<dyn DepthBackend>,
    failures: u64,
}

impl DepthEstimator {
    pub fn new(backend: Box<dyn DepthBackend>) -> Self {
        Self {
            backend,
            failures: 0,
        }
    }

    /// Build the estimator described by `artifact`. Fails with `ModelLoad`.
    pub fn load(artifact: &ModelArtifact) -> PipelineResult<Self> {
        let backend = load_backend(artifact)?;
        log::info!(
            "DepthEstimator: loaded {} backend from {}",
            backend.name(),
            artifact.topology
        );
        Ok(Self::new(backend))
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// Estimations that fell back to a zero map since construction.
    pub fn failures(&self) -> u64 {
        self.failures
    }

    /// Depth map at frame resolution.
    pub fn estimate(&mut self, frame: &Frame) -> DepthMap {
        match self.backend.estimate(frame.image()) {
            Ok(map) => map.resized(frame.width(), frame.height()),
            Err(err) => {
                self.failures += 1;
                log::warn!(
                    "DepthEstimator: frame {} estimation failed, using zero map: {}",
                    frame.index(),
                    err
                );
                DepthMap::zeros(frame.width(), frame.height())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::depth::backends::{FailingDepthBackend, StubDepthBackend};
    use image::RgbImage;

    #[test]
    fn output_matches_frame_resolution() {
        let mut estimator = DepthEstimator::new(Box::new(StubDepthBackend));
        let frame = Frame::from_image(RgbImage::new(160, 120));
        let map = estimator.estimate(&frame);
        assert_eq!((map.width(), map.height()), (160, 120));
        assert!(!map.is_zero());
    }

    #[test]
    fn failure_yields_zero_map() {
        let mut estimator = DepthEstimator::new(Box::new(FailingDepthBackend));
        let frame = Frame::from_image(RgbImage::new(32, 24));
        let map = estimator.estimate(&frame);
        assert_eq!((map.width(), map.height()), (32, 24));
        assert!(map.is_zero());
        assert_eq!(estimator.failures(), 1);
    }

    #[test]
    fn stub_artifacts_select_stub_backends() -> PipelineResult<()> {
        let ramp = DepthEstimator::load(&ModelArtifact::stub("ramp", 256))?;
        assert_eq!(ramp.backend_name(), "stub");
        let failing = DepthEstimator::load(&ModelArtifact::stub("failing", 256))?;
        assert_eq!(failing.backend_name(), "failing");
        Ok(())
    }
}
