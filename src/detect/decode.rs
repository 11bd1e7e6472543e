//! YOLO output tensor decoding and non-maximum suppression.
//!
//! Two export layouts are understood:
//! - anchor-free (YOLOv8 style): `[1, 4 + C, N]`, channel-major, class scores only
//! - anchor-based (YOLOv5 style): `[1, N, 5 + C]`, row-major, objectness times class score
//!
//! The layout is resolved against the number of classes in the label table.
//! Box centers and sizes are in model-input pixels and are rescaled to the
//! source image.

use crate::detect::backend::{BoundingBox, RawDetection};
use crate::error::{PipelineError, PipelineResult};

pub const NMS_IOU_THRESHOLD: f32 = 0.45;
pub const MAX_DETECTIONS: usize = 300;

/// Model input size and source image size. The input is a plain stretch of
/// the image, so each axis scales independently.
#[derive(Clone, Copy, Debug)]
pub struct InputGeometry {
    pub input_width: u32,
    pub input_height: u32,
    pub image_width: u32,
    pub image_height: u32,
}

impl InputGeometry {
    fn scale(&self) -> (f32, f32) {
        (
            self.image_width as f32 / self.input_width as f32,
            self.image_height as f32 / self.input_height as f32,
        )
    }
}

/// How rows and columns of a detector output are arranged.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputLayout {
    /// `[4 + C, N]`: one channel per box coordinate and class.
    AnchorFree { anchors: usize },
    /// `[N, 5 + C]`: one row per anchor with an objectness column.
    AnchorBased { anchors: usize },
}

impl OutputLayout {
    /// Match a `rows` x `cols` output against `class_count` classes. When
    /// both layouts fit, the anchor-free one wins.
    pub fn resolve(rows: usize, cols: usize, class_count: usize) -> PipelineResult<Self> {
        if class_count == 0 {
            return Err(PipelineError::Detection(
                "detector has no classes to decode".into(),
            ));
        }
        if rows == 4 + class_count {
            Ok(OutputLayout::AnchorFree { anchors: cols })
        } else if cols == 5 + class_count {
            Ok(OutputLayout::AnchorBased { anchors: rows })
        } else {
            Err(PipelineError::Detection(format!(
                "detector output [{rows}, {cols}] matches neither [{}, N] nor [N, {}] for {class_count} classes",
                4 + class_count,
                5 + class_count
            )))
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    class_id: usize,
    score: f32,
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
}

impl Candidate {
    fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    fn iou(&self, other: &Candidate) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }
}

/// Decode a raw YOLO output tensor with `class_count` classes into boxes
/// above `score_floor`.
pub fn decode_yolo(
    data: &[f32],
    shape: &[usize],
    geometry: InputGeometry,
    class_count: usize,
    score_floor: f32,
) -> PipelineResult<Vec<RawDetection>> {
    let (rows, cols) = match shape {
        [1, rows, cols] => (*rows, *cols),
        [rows, cols] => (*rows, *cols),
        other => {
            return Err(PipelineError::Detection(format!(
                "unsupported detector output shape {other:?}"
            )))
        }
    };
    if data.len() < rows * cols {
        return Err(PipelineError::Detection(format!(
            "detector output holds {} values, shape {:?} needs {}",
            data.len(),
            shape,
            rows * cols
        )));
    }

    let candidates = match OutputLayout::resolve(rows, cols, class_count)? {
        OutputLayout::AnchorFree { anchors } => anchor_free(data, rows, anchors, score_floor),
        OutputLayout::AnchorBased { anchors } => anchor_based(data, anchors, cols, score_floor),
    };

    let (sx, sy) = geometry.scale();
    let kept = non_max_suppression(candidates, NMS_IOU_THRESHOLD, MAX_DETECTIONS);
    Ok(kept
        .into_iter()
        .map(|c| RawDetection {
            class_id: c.class_id,
            confidence: c.score,
            bbox: BoundingBox::new(
                (c.x1 * sx).round() as i32,
                (c.y1 * sy).round() as i32,
                (c.x2 * sx).round() as i32,
                (c.y2 * sy).round() as i32,
            ),
        })
        .collect())
}

fn anchor_free(data: &[f32], channels: usize, anchors: usize, floor: f32) -> Vec<Candidate> {
    let at = |channel: usize, anchor: usize| data[channel * anchors + anchor];
    (0..anchors)
        .filter_map(|i| {
            let (class_id, score) = (4..channels)
                .map(|c| (c - 4, at(c, i)))
                .fold((0, f32::NEG_INFINITY), |best, cur| {
                    if cur.1 > best.1 {
                        cur
                    } else {
                        best
                    }
                });
            (score >= floor).then(|| from_center(class_id, score, at(0, i), at(1, i), at(2, i), at(3, i)))
        })
        .collect()
}

fn anchor_based(data: &[f32], anchors: usize, width: usize, floor: f32) -> Vec<Candidate> {
    data.chunks_exact(width)
        .take(anchors)
        .filter_map(|row| {
            let objectness = row[4];
            let (class_id, class_score) = row[5..]
                .iter()
                .copied()
                .enumerate()
                .fold((0, f32::NEG_INFINITY), |best, cur| {
                    if cur.1 > best.1 {
                        cur
                    } else {
                        best
                    }
                });
            let score = objectness * class_score;
            (score >= floor).then(|| from_center(class_id, score, row[0], row[1], row[2], row[3]))
        })
        .collect()
}

fn from_center(class_id: usize, score: f32, cx: f32, cy: f32, w: f32, h: f32) -> Candidate {
    Candidate {
        class_id,
        score,
        x1: cx - w / 2.0,
        y1: cy - h / 2.0,
        x2: cx + w / 2.0,
        y2: cy + h / 2.0,
    }
}

/// Greedy per-class suppression, highest score first.
fn non_max_suppression(mut candidates: Vec<Candidate>, iou: f32, limit: usize) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut kept: Vec<Candidate> = Vec::new();
    for candidate in candidates {
        if kept.len() >= limit {
            break;
        }
        let overlaps = kept
            .iter()
            .any(|k| k.class_id == candidate.class_id && k.iou(&candidate) > iou);
        if !overlaps {
            kept.push(candidate);
        }
    }
    kept
}
