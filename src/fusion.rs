//! Proximity and direction signals.
//!
//! The classification is purely geometric: a box that is horizontally
//! centred and reaches far down the frame is treated as near. The depth map
//! only contributes the reported `depth` median and never changes the
//! NEAR/FAR decision, so a failed depth model cannot break warnings.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::depth::DepthMap;
use crate::detect::{BoundingBox, Detection};

/// `gradient` strictly above this is NEAR.
pub const NEAR_GRADIENT_THRESHOLD: f64 = 0.85;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Left,
    Right,
}

impl Direction {
    /// LEFT only when the box centre is strictly left of the frame centre.
    pub fn from_offset(offset: f64) -> Self {
        if offset < 0.0 {
            Direction::Left
        } else {
            Direction::Right
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Left => "LEFT",
            Direction::Right => "RIGHT",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Proximity {
    Near,
    Far,
}

impl Proximity {
    pub fn from_gradient(gradient: f64) -> Self {
        if gradient > NEAR_GRADIENT_THRESHOLD {
            Proximity::Near
        } else {
            Proximity::Far
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Proximity::Near => "NEAR",
            Proximity::Far => "FAR",
        }
    }
}

impl fmt::Display for Proximity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signal derived from one detection and the frame geometry.
#[derive(Clone, Debug, PartialEq)]
pub struct ProximitySignal {
    pub sim_x: f64,
    pub sim_y: f64,
    pub gradient: f64,
    pub direction: Direction,
    pub proximity: Proximity,
    /// Empty unless `proximity` is NEAR.
    pub warning: String,
    /// Median depth over the box; informational only.
    pub depth: f32,
}

impl ProximitySignal {
    pub fn is_near(&self) -> bool {
        self.proximity == Proximity::Near
    }
}

pub fn warning_text(direction: Direction) -> String {
    format!("near-object warning, direction={direction}")
}

/// Compute the signal for `bbox` in a `width` x `height` frame.
pub fn proximity_signal(
    bbox: &BoundingBox,
    width: u32,
    height: u32,
    depth: Option<&DepthMap>,
) -> ProximitySignal {
    let center_x = (f64::from(bbox.x1) + f64::from(bbox.x2)) / 2.0;
    let frame_center_x = f64::from(width) / 2.0;
    let offset = center_x - frame_center_x;

    let sim_x = if frame_center_x > 0.0 {
        (1.0 - offset.abs() / frame_center_x).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let bottom_y = f64::from(bbox.y1.max(bbox.y2));
    let sim_y = if height > 0 {
        (bottom_y / f64::from(height)).clamp(0.0, 1.0)
    } else {
        0.0
    };

    let gradient = (sim_x + sim_y) / 2.0;
    let direction = Direction::from_offset(offset);
    let proximity = Proximity::from_gradient(gradient);
    let warning = match proximity {
        Proximity::Near => warning_text(direction),
        Proximity::Far => String::new(),
    };

    ProximitySignal {
        sim_x,
        sim_y,
        gradient,
        direction,
        proximity,
        warning,
        depth: depth.map_or(0.0, |map| map.median_in(bbox)),
    }
}

/// A detection together with its proximity signal.
#[derive(Clone, Debug, PartialEq)]
pub struct FusedDetection {
    pub detection: Detection,
    pub signal: ProximitySignal,
}

impl FusedDetection {
    pub fn record(&self) -> DetectionRecord {
        DetectionRecord {
            label: self.detection.label.clone(),
            confidence: self.detection.confidence,
            bbox: self.detection.bbox.as_array(),
            depth: self.signal.depth,
            sim_depth_x: self.signal.sim_x,
            sim_depth_y: self.signal.sim_y,
            sim_depth_gradient: self.signal.gradient,
            direction: self.signal.direction,
            warning: self.signal.warning.clone(),
            proximity: self.signal.proximity,
        }
    }
}

/// Wire shape of one detection in the single-shot response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub label: String,
    pub confidence: f32,
    pub bbox: [i32; 4],
    pub depth: f32,
    pub sim_depth_x: f64,
    pub sim_depth_y: f64,
    pub sim_depth_gradient: f64,
    pub direction: Direction,
    pub warning: String,
    pub proximity: Proximity,
}

/// Fused output for one frame.
#[derive(Clone, Debug, Default)]
pub struct FrameAnalysis {
    pub detections: Vec<FusedDetection>,
}

impl FrameAnalysis {
    /// Aggregate warning flag: any detection is NEAR.
    pub fn warning(&self) -> bool {
        self.detections.iter().any(|d| d.signal.is_near())
    }

    pub fn records(&self) -> Vec<DetectionRecord> {
        self.detections.iter().map(FusedDetection::record).collect()
    }
}

/// Attach a signal to every detection. Order is preserved.
pub fn fuse(
    detections: Vec<Detection>,
    width: u32,
    height: u32,
    depth: Option<&DepthMap>,
) -> FrameAnalysis {
    let detections = detections
        .into_iter()
        .map(|detection| {
            let signal = proximity_signal(&detection.bbox, width, height, depth);
            FusedDetection { detection, signal }
        })
        .collect();
    FrameAnalysis { detections }
}
