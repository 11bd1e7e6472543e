//! Frame annotation.
//!
//! Presentation only: nothing here feeds back into detections or signals.
//! Per detection the annotator draws the box in its class colour, a
//! `label conf` line, the `x/y/g` signal line and, for NEAR detections, a
//! filled warning banner. Stream frames additionally carry the per-label
//! count table (top-left) and the FPS estimate (top-right).

pub mod glyphs;

use std::collections::BTreeMap;

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::detect::BoundingBox;
use crate::frame::Frame;
use crate::fusion::{FrameAnalysis, FusedDetection};
use glyphs::{glyph, GLYPH_HEIGHT, GLYPH_WIDTH};

const GLYPH_ADVANCE: i32 = GLYPH_WIDTH as i32 + 1;
const TEXT_PAD: i32 = 2;
/// Height of one text strip including padding.
pub const LINE_HEIGHT: i32 = GLYPH_HEIGHT as i32 + 2 * TEXT_PAD;
pub const BANNER_HEIGHT: i32 = LINE_HEIGHT + 4;

const BOX_THICKNESS: i32 = 2;
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);
const PANEL_COLOR: Rgb<u8> = Rgb([20, 20, 20]);
const BANNER_COLOR: Rgb<u8> = Rgb([200, 0, 0]);

/// Where the warning banner ends up relative to its box.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BannerPlacement {
    /// Banner top edge at this y, above the box and its label line.
    Above(i32),
    /// No room above: banner top edge at this y, inside the box.
    Inside(i32),
}

impl BannerPlacement {
    pub fn top(&self) -> i32 {
        match self {
            BannerPlacement::Above(y) | BannerPlacement::Inside(y) => *y,
        }
    }
}

/// Banner sits above the label line over the box; if that would clip the
/// frame's top edge it flips to just inside the box's top edge.
pub fn banner_placement(bbox: &BoundingBox) -> BannerPlacement {
    let above = bbox.y1 - LINE_HEIGHT - BANNER_HEIGHT;
    if above >= 0 {
        BannerPlacement::Above(above)
    } else {
        BannerPlacement::Inside(bbox.y1 + BOX_THICKNESS)
    }
}

/// Stream overlay state, rendered from the session counters.
#[derive(Clone, Debug, Default)]
pub struct Overlay {
    pub fps: f64,
    pub label_counts: BTreeMap<String, u64>,
}

pub fn text_width(text: &str) -> i32 {
    text.chars().count() as i32 * GLYPH_ADVANCE
}

/// Draw `text` with its top-left corner at `(x, y)`. Pixels outside the
/// image are skipped; unknown characters advance without drawing.
pub fn draw_text(image: &mut RgbImage, x: i32, y: i32, text: &str, color: Rgb<u8>) {
    let (width, height) = (image.width() as i32, image.height() as i32);
    let mut pen_x = x;
    for ch in text.chars() {
        if let Some(rows) = glyph(ch) {
            for (row, bits) in rows.iter().enumerate() {
                let py = y + row as i32;
                if py < 0 || py >= height {
                    continue;
                }
                for col in 0..GLYPH_WIDTH as i32 {
                    let px = pen_x + col;
                    if (bits >> (GLYPH_WIDTH as i32 - 1 - col)) & 1 == 1 && px >= 0 && px < width {
                        image.put_pixel(px as u32, py as u32, color);
                    }
                }
            }
        }
        pen_x += GLYPH_ADVANCE;
    }
}

/// Text on a filled strip. The strip is clipped to the image.
fn draw_text_strip(image: &mut RgbImage, x: i32, y: i32, text: &str, fg: Rgb<u8>, bg: Rgb<u8>) {
    let strip_width = text_width(text) + 2 * TEXT_PAD;
    fill_clipped(image, x, y, strip_width, LINE_HEIGHT, bg);
    draw_text(image, x + TEXT_PAD, y + TEXT_PAD, text, fg);
}

fn fill_clipped(image: &mut RgbImage, x: i32, y: i32, w: i32, h: i32, color: Rgb<u8>) {
    let x1 = x.max(0);
    let y1 = y.max(0);
    let x2 = (x + w).min(image.width() as i32);
    let y2 = (y + h).min(image.height() as i32);
    if x1 < x2 && y1 < y2 {
        let rect = Rect::at(x1, y1).of_size((x2 - x1) as u32, (y2 - y1) as u32);
        draw_filled_rect_mut(image, rect, color);
    }
}

fn draw_box(image: &mut RgbImage, bbox: &BoundingBox, color: Rgb<u8>) {
    for inset in 0..BOX_THICKNESS {
        let w = bbox.width() - 2 * inset;
        let h = bbox.height() - 2 * inset;
        if w <= 0 || h <= 0 {
            break;
        }
        let rect = Rect::at(bbox.x1 + inset, bbox.y1 + inset).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(image, rect, color);
    }
}

fn signal_line(fused: &FusedDetection) -> String {
    format!(
        "x:{:.2} y:{:.2} g:{:.2}",
        fused.signal.sim_x, fused.signal.sim_y, fused.signal.gradient
    )
}

#[derive(Clone, Copy, Debug, Default)]
pub struct FrameAnnotator;

impl FrameAnnotator {
    pub fn new() -> Self {
        Self
    }

    /// Render `analysis` (and the optional stream overlay) onto a copy of
    /// the frame.
    pub fn annotate(
        &self,
        frame: &Frame,
        analysis: &FrameAnalysis,
        overlay: Option<&Overlay>,
    ) -> RgbImage {
        let mut image = frame.image().clone();
        for fused in &analysis.detections {
            self.draw_detection(&mut image, fused);
        }
        if let Some(overlay) = overlay {
            draw_count_table(&mut image, &overlay.label_counts);
            draw_fps(&mut image, overlay.fps);
        }
        image
    }

    fn draw_detection(&self, image: &mut RgbImage, fused: &FusedDetection) {
        let bbox = &fused.detection.bbox;
        let color = Rgb(fused.detection.color);
        draw_box(image, bbox, color);

        let label = format!(
            "{} {:.2}",
            fused.detection.label, fused.detection.confidence
        );
        let label_y = (bbox.y1 - LINE_HEIGHT).max(0);
        draw_text_strip(image, bbox.x1, label_y, &label, TEXT_COLOR, color);

        let mut signal_y = bbox.y1 + BOX_THICKNESS;
        if fused.signal.is_near() {
            let placement = banner_placement(bbox);
            let text = fused.signal.warning.as_str();
            let banner_width = text_width(text) + 2 * TEXT_PAD;
            fill_clipped(image, bbox.x1, placement.top(), banner_width, BANNER_HEIGHT, BANNER_COLOR);
            draw_text(
                image,
                bbox.x1 + TEXT_PAD,
                placement.top() + (BANNER_HEIGHT - GLYPH_HEIGHT as i32) / 2,
                text,
                TEXT_COLOR,
            );
            if let BannerPlacement::Inside(top) = placement {
                signal_y = top + BANNER_HEIGHT;
            }
        }
        draw_text_strip(image, bbox.x1 + BOX_THICKNESS, signal_y, &signal_line(fused), TEXT_COLOR, PANEL_COLOR);
    }
}

/// Running per-label tally, one `label: count` row each, top-left.
fn draw_count_table(image: &mut RgbImage, counts: &BTreeMap<String, u64>) {
    for (row, (label, count)) in counts.iter().enumerate() {
        let y = TEXT_PAD + row as i32 * LINE_HEIGHT;
        draw_text_strip(image, TEXT_PAD, y, &format!("{label}: {count}"), TEXT_COLOR, PANEL_COLOR);
    }
}

fn draw_fps(image: &mut RgbImage, fps: f64) {
    let text = format!("FPS {fps:.1}");
    let x = image.width() as i32 - text_width(&text) - 3 * TEXT_PAD;
    draw_text_strip(image, x.max(0), TEXT_PAD, &text, TEXT_COLOR, PANEL_COLOR);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::Detection;
    use crate::fusion::fuse;

    fn detection(bbox: BoundingBox) -> Detection {
        Detection {
            label: "person".into(),
            class_id: 0,
            confidence: 0.9,
            bbox,
            color: [0, 255, 0],
        }
    }

    #[test]
    fn banner_flips_inside_near_top_edge() {
        let low = BoundingBox::new(300, 400, 340, 470);
        assert_eq!(
            banner_placement(&low),
            BannerPlacement::Above(400 - LINE_HEIGHT - BANNER_HEIGHT)
        );

        let high = BoundingBox::new(300, 5, 340, 470);
        assert_eq!(banner_placement(&high), BannerPlacement::Inside(5 + BOX_THICKNESS));

        let exact = BoundingBox::new(0, LINE_HEIGHT + BANNER_HEIGHT, 10, 470);
        assert_eq!(banner_placement(&exact), BannerPlacement::Above(0));
    }

    #[test]
    fn near_detection_gets_banner_far_does_not() {
        let frame = Frame::from_image(RgbImage::from_pixel(640, 480, Rgb([90, 90, 90])));
        let near_box = BoundingBox::new(300, 400, 340, 470);
        let analysis = fuse(vec![detection(near_box)], 640, 480, None);
        let image = FrameAnnotator::new().annotate(&frame, &analysis, None);
        let top = banner_placement(&near_box).top();
        assert_eq!(*image.get_pixel(301, top as u32), BANNER_COLOR);
        assert_eq!(*image.get_pixel(300, 469), Rgb([0, 255, 0]));

        let far_box = BoundingBox::new(0, 200, 50, 250);
        let analysis = fuse(vec![detection(far_box)], 640, 480, None);
        let image = FrameAnnotator::new().annotate(&frame, &analysis, None);
        assert!(!image.pixels().any(|p| *p == BANNER_COLOR));
    }

    #[test]
    fn overlay_draws_counts_and_fps_panels() {
        let frame = Frame::from_image(RgbImage::from_pixel(320, 240, Rgb([90, 90, 90])));
        let overlay = Overlay {
            fps: 14.8,
            label_counts: [("person".to_string(), 3)].into_iter().collect(),
        };
        let image = FrameAnnotator::new().annotate(&frame, &FrameAnalysis::default(), Some(&overlay));
        assert_eq!(*image.get_pixel(TEXT_PAD as u32, TEXT_PAD as u32), PANEL_COLOR);
        assert_eq!(*image.get_pixel(319 - 3 * TEXT_PAD as u32, TEXT_PAD as u32), PANEL_COLOR);
        assert_eq!(*image.get_pixel(160, 200), Rgb([90, 90, 90]));
    }

    #[test]
    fn text_is_clipped_not_panicking() {
        let mut image = RgbImage::new(8, 8);
        draw_text(&mut image, -3, -2, "WARNING", TEXT_COLOR);
        draw_text(&mut image, 6, 6, "X", TEXT_COLOR);
    }
}
