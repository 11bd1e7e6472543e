use std::collections::BTreeSet;

use image::RgbImage;
use serde::Serialize;

use crate::config::{ModelArtifact, PipelineConfig};
use crate::detect::backend::{BoundingBox, DetectorBackend, RawDetection};
use crate::detect::backends::load_backend;
use crate::detect::labels::{class_color, LabelTable};
use crate::error::PipelineResult;
use crate::frame::Frame;

/// Scores below this are dropped inside the backend, before NMS. The
/// configured threshold is applied afterwards and is always at least this.
const BACKEND_SCORE_FLOOR: f32 = 0.05;

/// A detection that passed the confidence threshold and the suppression list.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub label: String,
    pub class_id: usize,
    pub confidence: f32,
    pub bbox: BoundingBox,
    /// Palette colour for the class, RGB.
    #[serde(skip)]
    pub color: [u8; 3],
}

#[derive(Clone, Debug)]
pub struct DetectorSettings {
    pub confidence_threshold: f32,
    pub blur_kernel: u32,
    pub suppressed_labels: BTreeSet<String>,
}

impl DetectorSettings {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            confidence_threshold: config.confidence_threshold,
            blur_kernel: config.blur_kernel,
            suppressed_labels: config.suppressed_labels.iter().cloned().collect(),
        }
    }
}

/// Noise-reduction pass applied to every frame before the backend sees it.
#[derive(Clone, Copy, Debug)]
pub struct SmoothingStage {
    kernel: u32,
}

impl SmoothingStage {
    pub fn new(kernel: u32) -> Self {
        Self { kernel }
    }

    pub fn apply(&self, frame: &Frame) -> RgbImage {
        frame.smoothed(self.kernel)
    }
}

/// Object detector: smoothing, backend inference, then thresholding,
/// label resolution, suppression and box clamping.
pub struct ObjectDetector {
    backend: Box<dyn DetectorBackend>,
    labels: LabelTable,
    smoothing: SmoothingStage,
    settings: DetectorSettings,
}

impl ObjectDetector {
    pub fn new(
        backend: Box<dyn DetectorBackend>,
        labels: LabelTable,
        settings: DetectorSettings,
    ) -> Self {
        Self {
            backend,
            labels,
            smoothing: SmoothingStage::new(settings.blur_kernel),
            settings,
        }
    }

    /// Build the detector described by `artifact`. Fails with `ModelLoad`.
    pub fn load(artifact: &ModelArtifact, config: &PipelineConfig) -> PipelineResult<Self> {
        let settings = DetectorSettings::from_config(config);
        let floor = settings.confidence_threshold.min(BACKEND_SCORE_FLOOR);
        let labels = match &config.labels_path {
            Some(path) => LabelTable::from_file(path)?,
            None => LabelTable::coco(),
        };
        let mut backend = load_backend(artifact, labels.len(), floor)?;
        backend.warm_up()?;
        log::info!(
            "ObjectDetector: loaded {} backend from {} ({} labels, threshold {:.2})",
            backend.name(),
            artifact.topology,
            labels.len(),
            settings.confidence_threshold
        );
        Ok(Self::new(backend, labels, settings))
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn settings(&self) -> &DetectorSettings {
        &self.settings
    }

    /// Detect objects in `frame`. Output order follows the backend.
    pub fn detect(&mut self, frame: &Frame) -> PipelineResult<Vec<Detection>> {
        let smoothed = self.smoothing.apply(frame);
        let raw = self.backend.detect(&smoothed)?;
        Ok(self.filter(raw, frame.width(), frame.height()))
    }

    /// Apply threshold, label table, suppression list and frame bounds.
    pub fn filter(&self, raw: Vec<RawDetection>, width: u32, height: u32) -> Vec<Detection> {
        raw.into_iter()
            .filter(|d| d.confidence >= self.settings.confidence_threshold)
            .filter_map(|d| {
                let label = self.labels.resolve(d.class_id);
                if self.settings.suppressed_labels.contains(&label) {
                    log::trace!("ObjectDetector: suppressed '{}'", label);
                    return None;
                }
                let bbox = d.bbox.clamp_to(width, height)?;
                Some(Detection {
                    label,
                    class_id: d.class_id,
                    confidence: d.confidence,
                    bbox,
                    color: class_color(d.class_id),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    struct Fixed(Vec<RawDetection>);

    impl DetectorBackend for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn detect(&mut self, _image: &RgbImage) -> PipelineResult<Vec<RawDetection>> {
            Ok(self.0.clone())
        }
    }

    struct Broken;

    impl DetectorBackend for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn detect(&mut self, _image: &RgbImage) -> PipelineResult<Vec<RawDetection>> {
            Err(PipelineError::Detection("inference exploded".into()))
        }
    }

    fn raw(class_id: usize, confidence: f32, bbox: [i32; 4]) -> RawDetection {
        RawDetection {
            class_id,
            confidence,
            bbox: BoundingBox::new(bbox[0], bbox[1], bbox[2], bbox[3]),
        }
    }

    fn settings(threshold: f32) -> DetectorSettings {
        DetectorSettings {
            confidence_threshold: threshold,
            blur_kernel: 5,
            suppressed_labels: ["cell phone".to_string()].into_iter().collect(),
        }
    }

    #[test]
    fn threshold_suppression_and_labels() -> PipelineResult<()> {
        let backend = Fixed(vec![
            raw(0, 0.91, [300, 400, 340, 470]),
            raw(67, 0.95, [10, 10, 30, 40]),
            raw(2, 0.49, [0, 0, 50, 50]),
            raw(2, 0.5, [0, 0, 50, 50]),
            raw(95, 0.7, [600, 0, 700, 100]),
        ]);
        let mut detector = ObjectDetector::new(Box::new(backend), LabelTable::coco(), settings(0.5));
        let frame = Frame::from_image(RgbImage::new(640, 480));
        let found = detector.detect(&frame)?;

        let labels: Vec<_> = found.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, vec!["person", "car", "id_95"]);
        assert!(found.iter().all(|d| d.confidence >= 0.5));
        assert_eq!(found[2].bbox, BoundingBox::new(600, 0, 640, 100));
        assert_eq!(found[0].color, class_color(0));
        Ok(())
    }

    #[test]
    fn backend_errors_propagate() {
        let mut detector = ObjectDetector::new(Box::new(Broken), LabelTable::coco(), settings(0.5));
        let frame = Frame::from_image(RgbImage::new(64, 48));
        let err = detector.detect(&frame).unwrap_err();
        assert_eq!(err.kind(), "detection");
    }

    #[test]
    fn stub_artifact_loads_without_files() -> PipelineResult<()> {
        let config = PipelineConfig::default();
        let detector = ObjectDetector::load(&ModelArtifact::stub("scene", 640), &config)?;
        assert_eq!(detector.backend_name(), "stub");
        Ok(())
    }

    #[test]
    fn missing_model_file_is_a_load_error() {
        let config = PipelineConfig::default();
        let mut artifact = config.detector.clone();
        artifact.topology = "/nonexistent/yolo.onnx".into();
        let err = ObjectDetector::load(&artifact, &config)
            .err()
            .expect("load must fail");
        assert_eq!(err.kind(), "model_load");
    }
}
