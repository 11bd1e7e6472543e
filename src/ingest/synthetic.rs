//! Synthetic frame source (`stub://<name>[?frames=N]`).
//!
//! Renders a simple street scene: a vertical ground gradient with a few
//! flat-coloured objects. The object colours match the keys used by the stub
//! detector backend, so the full pipeline produces real detections without
//! any model files. Without `frames=N` the source never ends.

use image::{Rgb, RgbImage};

use super::{FrameSource, SourceStats};
use crate::error::{PipelineError, PipelineResult};
use crate::frame::Frame;

pub const PERSON_COLOR: Rgb<u8> = Rgb([220, 40, 40]);
pub const CAR_COLOR: Rgb<u8> = Rgb([40, 40, 220]);
pub const PHONE_COLOR: Rgb<u8> = Rgb([40, 200, 40]);

pub struct SyntheticSource {
    name: String,
    width: u32,
    height: u32,
    frame_limit: Option<u64>,
    frame_count: u64,
    connected: bool,
}

impl SyntheticSource {
    pub fn new(spec: &str, width: u32, height: u32) -> PipelineResult<Self> {
        let (name, query) = match spec.split_once('?') {
            Some((name, query)) => (name, Some(query)),
            None => (spec, None),
        };
        let mut frame_limit = None;
        if let Some(query) = query {
            for pair in query.split('&') {
                match pair.split_once('=') {
                    Some(("frames", value)) => {
                        let limit = value.parse::<u64>().map_err(|_| {
                            PipelineError::source_open(
                                format!("stub://{spec}"),
                                "frames must be a non-negative integer",
                            )
                        })?;
                        frame_limit = Some(limit);
                    }
                    _ => {
                        return Err(PipelineError::source_open(
                            format!("stub://{spec}"),
                            format!("unsupported synthetic option '{pair}'"),
                        ))
                    }
                }
            }
        }
        if width < 32 || height < 32 {
            return Err(PipelineError::source_open(
                format!("stub://{spec}"),
                "synthetic scenes need at least 32x32 pixels",
            ));
        }
        Ok(Self {
            name: name.to_string(),
            width,
            height,
            frame_limit,
            frame_count: 0,
            connected: false,
        })
    }

    fn render(&self, t: u64) -> RgbImage {
        let (w, h) = (self.width, self.height);
        let mut image = RgbImage::from_fn(w, h, |_, y| {
            let shade = (60 + (120 * y) / h) as u8;
            Rgb([shade, shade, shade.saturating_add(10)])
        });

        // Pedestrian drifting across and towards the camera.
        let person_w = (w / 8).max(4);
        let person_h = (h / 3).max(4);
        let travel_x = w - person_w;
        let x1 = ((t * 8) % u64::from(travel_x)) as u32;
        let travel_y = h / 2;
        let bottom = h / 2 + ((t * 4) % u64::from(travel_y)) as u32;
        let y1 = bottom.saturating_sub(person_h);
        fill(&mut image, x1, y1, x1 + person_w, bottom, PERSON_COLOR);

        // Parked car on the left.
        let car_x1 = w / 16;
        let car_y1 = h / 2;
        fill(&mut image, car_x1, car_y1, car_x1 + w / 5, car_y1 + h / 6, CAR_COLOR);

        // Phone-shaped blob that the detector should suppress.
        let phone_x1 = w - w / 6;
        fill(&mut image, phone_x1, h / 10, phone_x1 + w / 20, h / 10 + h / 12, PHONE_COLOR);

        image
    }
}

fn fill(image: &mut RgbImage, x1: u32, y1: u32, x2: u32, y2: u32, color: Rgb<u8>) {
    let x2 = x2.min(image.width());
    let y2 = y2.min(image.height());
    for y in y1..y2 {
        for x in x1..x2 {
            image.put_pixel(x, y, color);
        }
    }
}

impl FrameSource for SyntheticSource {
    fn describe(&self) -> String {
        format!("stub://{}", self.name)
    }

    fn connect(&mut self) -> PipelineResult<()> {
        self.connected = true;
        log::info!("SyntheticSource: connected to stub://{}", self.name);
        Ok(())
    }

    fn next_frame(&mut self) -> PipelineResult<Option<Frame>> {
        if !self.connected {
            return Err(PipelineError::SourceRead("synthetic source not connected".into()));
        }
        if self.frame_limit.is_some_and(|limit| self.frame_count >= limit) {
            return Ok(None);
        }
        let image = self.render(self.frame_count);
        self.frame_count += 1;
        Ok(Some(Frame::from_image(image).with_index(self.frame_count)))
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.describe(),
        }
    }

    fn release(&mut self) {
        if self.connected {
            log::info!("SyntheticSource: released stub://{}", self.name);
        }
        self.connected = false;
    }
}
