//! Proximity Guard
//!
//! Pedestrian-assistance vision pipeline. Each frame from a camera, video
//! file or still image runs through an object detector and a monocular depth
//! estimator; every detection is then given a geometric proximity signal
//! (horizontal centring, vertical reach, NEAR/FAR, LEFT/RIGHT) and a
//! near-object warning when it is close.
//!
//! # Module Structure
//!
//! - `frame`: immutable RGB frames and the pre-detection smoothing stage
//! - `ingest`: frame sources (cameras, files, synthetic `stub://` scenes)
//! - `detect`: detector backends, label table, threshold and suppression
//! - `depth`: depth backends and the zero-map failure policy
//! - `fusion`: proximity/direction signal per detection
//! - `annotate`: boxes, labels, warning banners, count table, FPS
//! - `encode`: JPEG and multipart/x-mixed-replace framing
//! - `session`: per-stream state machine and counters
//! - `pipeline`: shared models, per-frame analysis, single-shot
//! - `api`: HTTP endpoints (`/health`, `/stream`, `/detect`)

pub mod annotate;
pub mod api;
pub mod config;
pub mod depth;
pub mod detect;
pub mod encode;
pub mod error;
pub mod frame;
pub mod fusion;
pub mod ingest;
pub mod pipeline;
pub mod session;

pub use config::{CaptureSettings, ModelArtifact, PipelineConfig, SourceSelector};
pub use depth::{DepthEstimator, DepthMap};
pub use detect::{BoundingBox, Detection, ObjectDetector};
pub use error::{PipelineError, PipelineResult};
pub use frame::Frame;
pub use fusion::{
    proximity_signal, DetectionRecord, Direction, FrameAnalysis, FusedDetection, Proximity,
    ProximitySignal, NEAR_GRADIENT_THRESHOLD,
};
pub use ingest::{build_source, FrameSource};
pub use pipeline::{DetectionsResponse, Pipeline};
pub use session::{CloseReason, FrameCounters, SessionState, StreamSession};
