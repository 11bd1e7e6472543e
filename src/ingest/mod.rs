//! Frame ingestion sources.
//!
//! This module provides the sources a session can read frames from:
//! - Local cameras by index (feature: ingest-v4l2)
//! - Local still images and image directories
//! - Local video files (feature: ingest-file-ffmpeg)
//! - Synthetic scenes (`stub://`) for tests and demos
//!
//! All sources produce immutable `Frame` instances. A source is opened with
//! `connect()`, read with `next_frame()` until it returns `Ok(None)` (end of
//! input) or an error, and must be `release()`d on every exit path. Sessions
//! own their source exclusively; sources are never shared.

pub mod camera;
pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod synthetic;

pub use camera::CameraSource;
pub use file::FileSource;
pub use synthetic::SyntheticSource;

use crate::config::{CaptureSettings, SourceSelector};
use crate::error::PipelineResult;
use crate::frame::Frame;

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}

/// A sequence of raw frames from a camera, file or synthetic scene.
pub trait FrameSource: Send {
    /// Human-readable source identifier for logs and errors.
    fn describe(&self) -> String;

    /// Open the underlying device or file. Fails with `SourceOpen`.
    fn connect(&mut self) -> PipelineResult<()>;

    /// Next frame, `Ok(None)` once the input is exhausted.
    fn next_frame(&mut self) -> PipelineResult<Option<Frame>>;

    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;

    /// Release device/file handles. Must be idempotent.
    fn release(&mut self);
}

/// Build (but do not open) the source named by `selector`.
pub fn build_source(
    selector: &SourceSelector,
    capture: &CaptureSettings,
) -> PipelineResult<Box<dyn FrameSource>> {
    let source: Box<dyn FrameSource> = match selector {
        SourceSelector::Camera(index) => Box::new(CameraSource::new(*index, capture.clone())),
        SourceSelector::File(path) => Box::new(FileSource::new(path.clone(), capture.target_fps)),
        SourceSelector::Synthetic(spec) => Box::new(SyntheticSource::new(
            spec,
            capture.width,
            capture.height,
        )?),
    };
    Ok(source)
}
