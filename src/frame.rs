//! Frame container.
//!
//! - `Frame`: immutable 3-channel RGB raster produced by a frame source (or
//!   decoded from an upload). There is no mutable accessor; the detector and
//!   depth estimator may read the same frame concurrently.
//! - Smoothing helpers used by the detector's blur stage.

use image::{imageops, RgbImage};
use std::time::Instant;

use crate::error::{PipelineError, PipelineResult};

/// Immutable RGB frame. Owned by the pipeline iteration that produced it.
pub struct Frame {
    image: RgbImage,
    /// Sequence number within the producing source (0 for single images).
    index: u64,
    captured_at: Instant,
}

// Deliberately no `DerefMut`, no `&mut RgbImage` accessor.

impl Frame {
    /// Wrap packed RGB24 pixels. Length must be exactly `width * height * 3`.
    pub fn from_rgb(pixels: Vec<u8>, width: u32, height: u32) -> PipelineResult<Self> {
        if width == 0 || height == 0 {
            return Err(PipelineError::Decode(format!(
                "frame dimensions must be positive, got {width}x{height}"
            )));
        }
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| PipelineError::Decode("frame dimensions overflow".into()))?;
        if pixels.len() != expected {
            return Err(PipelineError::Decode(format!(
                "expected {} RGB bytes, received {}",
                expected,
                pixels.len()
            )));
        }
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| PipelineError::Decode("failed to wrap RGB buffer".into()))?;
        Ok(Self::from_image(image))
    }

    pub fn from_image(image: RgbImage) -> Self {
        Self {
            image,
            index: 0,
            captured_at: Instant::now(),
        }
    }

    /// Decode an encoded still image (JPEG/PNG) into a frame.
    pub fn decode(bytes: &[u8]) -> PipelineResult<Self> {
        if bytes.is_empty() {
            return Err(PipelineError::Decode("image payload is empty".into()));
        }
        let decoded = image::load_from_memory(bytes)
            .map_err(|e| PipelineError::Decode(format!("failed to decode image: {e}")))?;
        let image = decoded.to_rgb8();
        if image.width() == 0 || image.height() == 0 {
            return Err(PipelineError::Decode("decoded image has no pixels".into()));
        }
        Ok(Self::from_image(image))
    }

    pub(crate) fn with_index(mut self, index: u64) -> Self {
        self.index = index;
        self
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn captured_at(&self) -> Instant {
        self.captured_at
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }

    /// Gaussian-smoothed copy of the frame. A kernel of 0 or 1 is a plain copy.
    pub fn smoothed(&self, kernel: u32) -> RgbImage {
        match gaussian_sigma(kernel) {
            Some(sigma) => imageops::blur(&self.image, sigma),
            None => self.image.clone(),
        }
    }
}

/// Sigma for an odd Gaussian kernel size, using the usual
/// `0.3 * ((k - 1) * 0.5 - 1) + 0.8` relation. `None` when smoothing is off.
pub fn gaussian_sigma(kernel: u32) -> Option<f32> {
    if kernel <= 1 {
        return None;
    }
    Some(0.3 * ((kernel as f32 - 1.0) * 0.5 - 1.0) + 0.8)
}
