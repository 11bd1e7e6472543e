#![cfg(feature = "backend-tract")]

use std::path::Path;

use image::RgbImage;
use tract_onnx::prelude::*;

use crate::config::ModelArtifact;
use crate::depth::backend::DepthBackend;
use crate::depth::map::DepthMap;
use crate::detect::backends::tract::{image_to_tensor, load_onnx_plan, OnnxPlan};
use crate::error::{PipelineError, PipelineResult};

/// MiDaS-style relative depth via tract. Input is the frame stretched to the
/// model size with pixel values in [0, 1], the same tensor the detector gets.
/// Output is inverse depth at the model resolution, `[1, H, W]` or
/// `[1, 1, H, W]`.
pub struct TractDepthBackend {
    model: OnnxPlan,
    width: u32,
    height: u32,
}

impl TractDepthBackend {
    pub fn load(artifact: &ModelArtifact) -> PipelineResult<Self> {
        let model = load_onnx_plan(
            "depth",
            Path::new(&artifact.topology),
            artifact.input_width,
            artifact.input_height,
        )?;
        Ok(Self {
            model,
            width: artifact.input_width,
            height: artifact.input_height,
        })
    }
}

impl DepthBackend for TractDepthBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn estimate(&mut self, image: &RgbImage) -> PipelineResult<DepthMap> {
        let input = image_to_tensor(image, self.width, self.height);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|e| PipelineError::DepthEstimation(format!("ONNX inference failed: {e:#}")))?;
        let output = outputs
            .first()
            .ok_or_else(|| PipelineError::DepthEstimation("model produced no outputs".into()))?;
        let (h, w) = match output.shape() {
            [1, h, w] | [1, 1, h, w] => (*h, *w),
            other => {
                return Err(PipelineError::DepthEstimation(format!(
                    "unsupported depth output shape {other:?}"
                )))
            }
        };
        let data = output.as_slice::<f32>().map_err(|e| {
            PipelineError::DepthEstimation(format!("output tensor was not f32: {e:#}"))
        })?;
        let w32 = w as u32;
        Ok(DepthMap::from_fn(w32, h as u32, |x, y| {
            data.get(y as usize * w + x as usize).copied().unwrap_or(0.0)
        }))
    }
}
