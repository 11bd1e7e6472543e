//! Object detection.
//!
//! `ObjectDetector` wraps a `DetectorBackend` (stub or ONNX via tract) with
//! the per-frame policy: Gaussian pre-smoothing, the confidence threshold,
//! label resolution and the suppressed-label list.

mod backend;
pub mod backends;
pub mod decode;
mod detector;
pub mod labels;

pub use backend::{BoundingBox, DetectorBackend, RawDetection};
pub use backends::StubBackend;
pub use detector::{Detection, DetectorSettings, ObjectDetector, SmoothingStage};
pub use labels::LabelTable;
