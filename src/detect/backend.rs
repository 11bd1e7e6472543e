use image::RgbImage;
use serde::Serialize;

use crate::error::PipelineResult;

/// Axis-aligned box in source-frame pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct BoundingBox {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl BoundingBox {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Non-empty box with `x1 < x2` and `y1 < y2`.
    pub fn is_valid(&self) -> bool {
        self.x1 < self.x2 && self.y1 < self.y2
    }

    pub fn width(&self) -> i32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> i32 {
        self.y2 - self.y1
    }

    pub fn center_x(&self) -> f32 {
        (self.x1 as f32 + self.x2 as f32) / 2.0
    }

    /// Clip to `[0, width] x [0, height]`. `None` if nothing is left.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Self> {
        let w = width as i32;
        let h = height as i32;
        let clipped = Self {
            x1: self.x1.clamp(0, w),
            y1: self.y1.clamp(0, h),
            x2: self.x2.clamp(0, w),
            y2: self.y2.clamp(0, h),
        };
        clipped.is_valid().then_some(clipped)
    }

    pub fn as_array(&self) -> [i32; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

/// Detector output before thresholding, label resolution and suppression.
#[derive(Clone, Debug, PartialEq)]
pub struct RawDetection {
    pub class_id: usize,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Detector backend trait.
///
/// Backends receive the (already smoothed) RGB image and return boxes in the
/// same pixel space. They may pre-filter low scores for speed, but the
/// `ObjectDetector` wrapper owns the authoritative threshold.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on one image.
    fn detect(&mut self, image: &RgbImage) -> PipelineResult<Vec<RawDetection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> PipelineResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_discards_boxes_outside_frame() {
        let inside = BoundingBox::new(-10, 5, 50, 700);
        assert_eq!(inside.clamp_to(640, 480), Some(BoundingBox::new(0, 5, 50, 480)));

        let outside = BoundingBox::new(700, 10, 800, 20);
        assert_eq!(outside.clamp_to(640, 480), None);

        let degenerate = BoundingBox::new(10, 10, 10, 40);
        assert!(!degenerate.is_valid());
        assert_eq!(degenerate.clamp_to(640, 480), None);
    }

    #[test]
    fn center_uses_both_edges() {
        assert_eq!(BoundingBox::new(300, 400, 340, 470).center_x(), 320.0);
        assert_eq!(BoundingBox::new(0, 0, 51, 50).center_x(), 25.5);
    }
}
