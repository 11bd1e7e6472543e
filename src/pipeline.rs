//! Shared models and per-frame analysis.
//!
//! Models are loaded once at startup and shared by every session and
//! request behind one mutex each. Detection and depth estimation of a frame
//! run on two scoped threads and are joined before fusion.

use std::sync::{Arc, Mutex};
use std::thread;

use serde::{Deserialize, Serialize};

use crate::annotate::{FrameAnnotator, Overlay};
use crate::config::PipelineConfig;
use crate::depth::{DepthEstimator, DepthMap};
use crate::detect::{Detection, ObjectDetector};
use crate::encode::encode_jpeg;
use crate::error::{PipelineError, PipelineResult};
use crate::frame::Frame;
use crate::fusion::{fuse, DetectionRecord, FrameAnalysis};

pub type SharedDetector = Arc<Mutex<ObjectDetector>>;
pub type SharedDepth = Arc<Mutex<DepthEstimator>>;

/// Body of a successful single-shot call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionsResponse {
    pub status: String,
    pub detections: Vec<DetectionRecord>,
}

impl DetectionsResponse {
    pub fn success(analysis: &FrameAnalysis) -> Self {
        Self {
            status: "success".to_string(),
            detections: analysis.records(),
        }
    }
}

#[derive(Clone)]
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    detector: Option<SharedDetector>,
    depth: Option<SharedDepth>,
    annotator: FrameAnnotator,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        detector: Option<ObjectDetector>,
        depth: Option<DepthEstimator>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            detector: detector.map(|d| Arc::new(Mutex::new(d))),
            depth: depth.map(|d| Arc::new(Mutex::new(d))),
            annotator: FrameAnnotator::new(),
        }
    }

    /// Load both models. A model that fails to load is logged and left
    /// disabled; the pipeline still starts.
    pub fn from_config(config: PipelineConfig) -> Self {
        let detector = match ObjectDetector::load(&config.detector, &config) {
            Ok(detector) => Some(detector),
            Err(err) => {
                log::error!("Pipeline: object detector disabled: {}", err);
                None
            }
        };
        let depth = match DepthEstimator::load(&config.depth) {
            Ok(depth) => Some(depth),
            Err(err) => {
                log::error!("Pipeline: depth estimator disabled: {}", err);
                None
            }
        };
        Self::new(config, detector, depth)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn has_detector(&self) -> bool {
        self.detector.is_some()
    }

    pub fn has_depth(&self) -> bool {
        self.depth.is_some()
    }

    /// Streaming refuses to start unless both models are loaded.
    pub fn ensure_stream_ready(&self) -> PipelineResult<()> {
        if self.detector.is_none() {
            return Err(PipelineError::ModelUnavailable("detector"));
        }
        if self.depth.is_none() {
            return Err(PipelineError::ModelUnavailable("depth"));
        }
        Ok(())
    }

    /// Detection, depth and fusion for one frame.
    pub fn analyze(&self, frame: &Frame) -> PipelineResult<FrameAnalysis> {
        let detector = self
            .detector
            .as_ref()
            .ok_or(PipelineError::ModelUnavailable("detector"))?;

        let (detections, depth) = thread::scope(|scope| {
            let depth_task = scope.spawn(|| self.estimate_depth(frame));
            let detections = run_detector(detector, frame);
            let depth = depth_task.join().unwrap_or_else(|_| {
                log::error!("Pipeline: depth task panicked, using zero map");
                DepthMap::zeros(frame.width(), frame.height())
            });
            (detections, depth)
        });

        Ok(fuse(detections?, frame.width(), frame.height(), Some(&depth)))
    }

    fn estimate_depth(&self, frame: &Frame) -> DepthMap {
        let Some(depth) = &self.depth else {
            log::debug!(
                "Pipeline: no depth model, zero map for frame {}",
                frame.index()
            );
            return DepthMap::zeros(frame.width(), frame.height());
        };
        match depth.lock() {
            Ok(mut estimator) => estimator.estimate(frame),
            Err(_) => {
                log::warn!("Pipeline: depth estimator lock poisoned, using zero map");
                DepthMap::zeros(frame.width(), frame.height())
            }
        }
    }

    /// Decode one uploaded image and analyse it. No counters, no stream.
    pub fn single_shot(&self, bytes: &[u8]) -> PipelineResult<FrameAnalysis> {
        let frame = Frame::decode(bytes)?;
        self.analyze(&frame)
    }

    /// Annotate and JPEG-encode a frame.
    pub fn render(
        &self,
        frame: &Frame,
        analysis: &FrameAnalysis,
        overlay: Option<&Overlay>,
    ) -> PipelineResult<Vec<u8>> {
        let image = self.annotator.annotate(frame, analysis, overlay);
        encode_jpeg(&image, self.config.jpeg_quality)
    }
}

fn run_detector(detector: &SharedDetector, frame: &Frame) -> PipelineResult<Vec<Detection>> {
    let mut guard = detector
        .lock()
        .map_err(|_| PipelineError::Detection("detector lock poisoned".into()))?;
    guard.detect(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelArtifact;
    use crate::depth::backends::{FailingDepthBackend, StubDepthBackend};
    use crate::ingest::synthetic::SyntheticSource;
    use crate::ingest::FrameSource;

    fn stub_config() -> PipelineConfig {
        PipelineConfig {
            detector: ModelArtifact::stub("scene", 640),
            depth: ModelArtifact::stub("ramp", 256),
            ..PipelineConfig::default()
        }
    }

    fn scene_frame() -> PipelineResult<Frame> {
        let mut source = SyntheticSource::new("scene", 320, 240)?;
        source.connect()?;
        source
            .next_frame()?
            .ok_or_else(|| PipelineError::SourceRead("no frame".into()))
    }

    #[test]
    fn stub_models_produce_fused_detections() -> PipelineResult<()> {
        let pipeline = Pipeline::from_config(stub_config());
        assert!(pipeline.has_detector() && pipeline.has_depth());
        let analysis = pipeline.analyze(&scene_frame()?)?;
        let labels: Vec<_> = analysis
            .detections
            .iter()
            .map(|d| d.detection.label.as_str())
            .collect();
        assert!(labels.contains(&"person"));
        assert!(labels.contains(&"car"));
        assert!(!labels.contains(&"cell phone"));
        assert!(analysis.detections.iter().all(|d| d.signal.depth > 0.0));
        // the stub ramp reaches 10 at the bottom row; resizing must not squash it
        assert!(analysis.detections.iter().any(|d| d.signal.depth > 1.0));
        Ok(())
    }

    #[test]
    fn depth_failure_does_not_change_signals() -> PipelineResult<()> {
        let config = stub_config();
        let detector = ObjectDetector::load(&config.detector, &config)?;
        let healthy = Pipeline::new(
            config.clone(),
            Some(detector),
            Some(DepthEstimator::new(Box::new(StubDepthBackend))),
        );
        let detector = ObjectDetector::load(&config.detector, &config)?;
        let failing = Pipeline::new(
            config,
            Some(detector),
            Some(DepthEstimator::new(Box::new(FailingDepthBackend))),
        );

        let frame = scene_frame()?;
        let good = healthy.analyze(&frame)?;
        let bad = failing.analyze(&frame)?;
        assert_eq!(good.detections.len(), bad.detections.len());
        for (g, b) in good.detections.iter().zip(&bad.detections) {
            assert_eq!(g.signal.proximity, b.signal.proximity);
            assert_eq!(g.signal.direction, b.signal.direction);
            assert_eq!(g.signal.gradient, b.signal.gradient);
            assert_eq!(b.signal.depth, 0.0);
        }
        Ok(())
    }

    #[test]
    fn streaming_requires_both_models() {
        let pipeline = Pipeline::new(stub_config(), None, None);
        let err = pipeline.ensure_stream_ready().unwrap_err();
        assert_eq!(err.kind(), "model_unavailable");
        assert!(pipeline.single_shot(b"not an image").is_err());
    }

    #[test]
    fn single_shot_with_missing_depth_reports_zero_depth() -> PipelineResult<()> {
        let config = stub_config();
        let detector = ObjectDetector::load(&config.detector, &config)?;
        let pipeline = Pipeline::new(config, Some(detector), None);
        let jpeg = encode_jpeg(scene_frame()?.image(), 95)?;
        let analysis = pipeline.single_shot(&jpeg)?;
        assert!(!analysis.detections.is_empty());
        assert!(analysis.detections.iter().all(|d| d.signal.depth == 0.0));
        Ok(())
    }
}
