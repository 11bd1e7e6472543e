use image::{Rgb, RgbImage};

use crate::detect::backend::{BoundingBox, DetectorBackend, RawDetection};
use crate::error::PipelineResult;
use crate::ingest::synthetic::{CAR_COLOR, PERSON_COLOR, PHONE_COLOR};

/// Max per-channel distance for a pixel to match a colour key.
const KEY_TOLERANCE: i16 = 30;
/// Minimum matching pixels before a key is reported.
const MIN_KEY_PIXELS: u32 = 16;

struct ColorKey {
    color: Rgb<u8>,
    class_id: usize,
    confidence: f32,
}

const KEYS: [ColorKey; 3] = [
    ColorKey {
        color: PERSON_COLOR,
        class_id: 0,
        confidence: 0.91,
    },
    ColorKey {
        color: CAR_COLOR,
        class_id: 2,
        confidence: 0.84,
    },
    ColorKey {
        color: PHONE_COLOR,
        class_id: 67,
        confidence: 0.88,
    },
];

/// Stub backend for tests and demos.
///
/// Reports one box per colour key present in the image, spanning every
/// matching pixel. Pairs with the `stub://` synthetic source so the full
/// pipeline runs without model files.
pub struct StubBackend {
    keys_enabled: bool,
}

impl StubBackend {
    pub fn new() -> Self {
        Self { keys_enabled: true }
    }

    /// Backend that never reports anything.
    pub fn empty() -> Self {
        Self {
            keys_enabled: false,
        }
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn matches(pixel: &Rgb<u8>, key: &Rgb<u8>) -> bool {
    pixel
        .0
        .iter()
        .zip(key.0.iter())
        .all(|(a, b)| (i16::from(*a) - i16::from(*b)).abs() <= KEY_TOLERANCE)
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, image: &RgbImage) -> PipelineResult<Vec<RawDetection>> {
        if !self.keys_enabled {
            return Ok(Vec::new());
        }
        let mut detections = Vec::new();
        for key in &KEYS {
            let mut count = 0u32;
            let (mut x1, mut y1, mut x2, mut y2) = (u32::MAX, u32::MAX, 0u32, 0u32);
            for (x, y, pixel) in image.enumerate_pixels() {
                if matches(pixel, &key.color) {
                    count += 1;
                    x1 = x1.min(x);
                    y1 = y1.min(y);
                    x2 = x2.max(x + 1);
                    y2 = y2.max(y + 1);
                }
            }
            if count >= MIN_KEY_PIXELS {
                detections.push(RawDetection {
                    class_id: key.class_id,
                    confidence: key.confidence,
                    bbox: BoundingBox::new(x1 as i32, y1 as i32, x2 as i32, y2 as i32),
                });
            }
        }
        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_keyed_blocks() -> PipelineResult<()> {
        let mut image = RgbImage::from_pixel(64, 48, Rgb([90, 90, 100]));
        for y in 10..30 {
            for x in 40..50 {
                image.put_pixel(x, y, PERSON_COLOR);
            }
        }
        let mut backend = StubBackend::new();
        let found = backend.detect(&image)?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].class_id, 0);
        assert_eq!(found[0].bbox, BoundingBox::new(40, 10, 50, 30));

        assert!(StubBackend::empty().detect(&image)?.is_empty());
        Ok(())
    }

    #[test]
    fn ignores_specks() -> PipelineResult<()> {
        let mut image = RgbImage::from_pixel(64, 48, Rgb([90, 90, 100]));
        image.put_pixel(3, 3, CAR_COLOR);
        assert!(StubBackend::new().detect(&image)?.is_empty());
        Ok(())
    }
}
