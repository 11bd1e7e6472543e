use image::{ImageBuffer, Luma};

use crate::detect::BoundingBox;

pub type DepthBuffer = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Per-pixel relative depth, same resolution as the frame it was estimated
/// from. Values are model-relative and only meaningful within one map.
#[derive(Clone, Debug)]
pub struct DepthMap {
    buffer: DepthBuffer,
}

impl DepthMap {
    pub fn new(buffer: DepthBuffer) -> Self {
        Self { buffer }
    }

    /// All-zero map, used whenever estimation is unavailable.
    pub fn zeros(width: u32, height: u32) -> Self {
        Self {
            buffer: ImageBuffer::new(width, height),
        }
    }

    pub fn from_fn(width: u32, height: u32, f: impl Fn(u32, u32) -> f32) -> Self {
        Self {
            buffer: ImageBuffer::from_fn(width, height, |x, y| Luma([f(x, y)])),
        }
    }

    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    pub fn get(&self, x: u32, y: u32) -> Option<f32> {
        self.buffer.get_pixel_checked(x, y).map(|p| p.0[0])
    }

    pub fn is_zero(&self) -> bool {
        self.buffer.as_raw().iter().all(|v| *v == 0.0)
    }

    /// Bilinear resample to `width` x `height`, sampling at pixel centres.
    /// Values are interpolated as-is: model output is unbounded and may be
    /// negative, so nothing is clamped.
    pub fn resized(&self, width: u32, height: u32) -> Self {
        let (src_w, src_h) = self.buffer.dimensions();
        if (src_w, src_h) == (width, height) {
            return self.clone();
        }
        if src_w == 0 || src_h == 0 {
            return Self::zeros(width, height);
        }
        let scale_x = src_w as f32 / width.max(1) as f32;
        let scale_y = src_h as f32 / height.max(1) as f32;
        let raw = self.buffer.as_raw();
        let at = |x: u32, y: u32| raw[(y * src_w + x) as usize];

        Self::from_fn(width, height, |x, y| {
            let (x0, x1, fx) = source_span(x, scale_x, src_w);
            let (y0, y1, fy) = source_span(y, scale_y, src_h);
            let top = at(x0, y0) + (at(x1, y0) - at(x0, y0)) * fx;
            let bottom = at(x0, y1) + (at(x1, y1) - at(x0, y1)) * fx;
            top + (bottom - top) * fy
        })
    }

    /// Median depth inside `bbox`, clipped to the map. An empty region
    /// yields 0. Even counts average the two middle values.
    pub fn median_in(&self, bbox: &BoundingBox) -> f32 {
        let x1 = bbox.x1.clamp(0, self.width() as i32) as u32;
        let x2 = bbox.x2.clamp(0, self.width() as i32) as u32;
        let y1 = bbox.y1.clamp(0, self.height() as i32) as u32;
        let y2 = bbox.y2.clamp(0, self.height() as i32) as u32;
        if x1 >= x2 || y1 >= y2 {
            return 0.0;
        }

        let mut values: Vec<f32> = (y1..y2)
            .flat_map(|y| (x1..x2).map(move |x| (x, y)))
            .map(|(x, y)| self.buffer.get_pixel(x, y).0[0])
            .filter(|v| !v.is_nan())
            .collect();
        if values.is_empty() {
            return 0.0;
        }
        values.sort_by(f32::total_cmp);
        let mid = values.len() / 2;
        if values.len() % 2 == 0 {
            (values[mid - 1] + values[mid]) / 2.0
        } else {
            values[mid]
        }
    }
}

/// Neighbouring source indices and blend weight for destination index `dst`.
fn source_span(dst: u32, scale: f32, len: u32) -> (u32, u32, f32) {
    let pos = ((dst as f32 + 0.5) * scale - 0.5).clamp(0.0, (len - 1) as f32);
    let lo = pos.floor() as u32;
    let hi = (lo + 1).min(len - 1);
    (lo, hi, pos - lo as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn median_over_box() {
        let map = DepthMap::from_fn(10, 10, |x, _| x as f32);
        // columns 2,3,4 -> median 3
        assert_eq!(map.median_in(&BoundingBox::new(2, 0, 5, 4)), 3.0);
        // columns 2..6 -> even count, (3 + 4) / 2
        assert_eq!(map.median_in(&BoundingBox::new(2, 0, 6, 1)), 3.5);
    }

    #[test]
    fn empty_or_outside_box_is_zero() {
        let map = DepthMap::from_fn(10, 10, |_, _| 7.0);
        assert_eq!(map.median_in(&BoundingBox::new(4, 4, 4, 8)), 0.0);
        assert_eq!(map.median_in(&BoundingBox::new(20, 20, 30, 30)), 0.0);
        assert_eq!(map.median_in(&BoundingBox::new(-5, -5, 3, 3)), 7.0);
    }

    #[test]
    fn zeros_and_resize() {
        let zeros = DepthMap::zeros(4, 3);
        assert!(zeros.is_zero());
        let flat = DepthMap::from_fn(8, 8, |_, _| 2.5).resized(16, 4);
        assert_eq!((flat.width(), flat.height()), (16, 4));
        assert!((flat.get(15, 3).unwrap_or_default() - 2.5).abs() < 1e-4);
    }

    #[test]
    fn resize_keeps_values_outside_unit_range() {
        let ramp = DepthMap::from_fn(64, 64, |_, y| (y + 1) as f32 / 64.0 * 10.0);
        let up = ramp.resized(640, 480);
        assert_eq!((up.width(), up.height()), (640, 480));
        let max = (0..480)
            .filter_map(|y| up.get(320, y))
            .fold(f32::NEG_INFINITY, f32::max);
        assert!((max - 10.0).abs() < 1e-4, "max was {max}");
        let min = (0..480)
            .filter_map(|y| up.get(0, y))
            .fold(f32::INFINITY, f32::min);
        assert!((min - 10.0 / 64.0).abs() < 1e-4, "min was {min}");

        let near = DepthMap::from_fn(32, 32, |_, _| 850.0).resized(100, 70);
        assert!((near.get(50, 35).unwrap_or_default() - 850.0).abs() < 1e-3);
        let negative = DepthMap::from_fn(32, 32, |_, _| -3.5).resized(100, 70);
        assert!((negative.get(99, 69).unwrap_or_default() + 3.5).abs() < 1e-4);
        assert!((near.median_in(&BoundingBox::new(0, 0, 100, 70)) - 850.0).abs() < 1e-3);
    }

    #[test]
    fn resize_interpolates_between_samples() {
        // Two columns, 0 and 100: doubling the width puts the inner samples
        // a quarter of the way in from each side.
        let map = DepthMap::from_fn(2, 1, |x, _| x as f32 * 100.0);
        let wide = map.resized(4, 1);
        let row: Vec<f32> = (0..4).filter_map(|x| wide.get(x, 0)).collect();
        assert_eq!(row, vec![0.0, 25.0, 75.0, 100.0]);

        let down = DepthMap::from_fn(4, 4, |x, _| x as f32).resized(2, 2);
        assert!((down.get(0, 0).unwrap_or_default() - 0.5).abs() < 1e-6);
        assert!((down.get(1, 1).unwrap_or_default() - 2.5).abs() < 1e-6);
    }
}
