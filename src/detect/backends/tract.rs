#![cfg(feature = "backend-tract")]

use std::path::Path;

use image::imageops::{self, FilterType};
use image::RgbImage;
use tract_onnx::prelude::*;

use crate::config::ModelArtifact;
use crate::detect::backend::{DetectorBackend, RawDetection};
use crate::detect::decode::{decode_yolo, InputGeometry};
use crate::error::{PipelineError, PipelineResult};

pub(crate) type OnnxPlan = TypedRunnableModel<TypedModel>;

/// Load and optimize an ONNX graph with a fixed `[1, 3, H, W]` f32 input.
pub(crate) fn load_onnx_plan(
    component: &'static str,
    model_path: &Path,
    width: u32,
    height: u32,
) -> PipelineResult<OnnxPlan> {
    let artifact = model_path.display().to_string();
    tract_onnx::onnx()
        .model_for_path(model_path)
        .and_then(|model| {
            model.with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
        })
        .and_then(|model| model.into_optimized())
        .and_then(|model| model.into_runnable())
        .map_err(|e| PipelineError::model_load(component, artifact, format!("{e:#}")))
}

/// Stretch to the model input and lay out as NCHW with values in [0, 1].
pub(crate) fn image_to_tensor(image: &RgbImage, width: u32, height: u32) -> Tensor {
    let resized = if image.dimensions() == (width, height) {
        image.clone()
    } else {
        imageops::resize(image, width, height, FilterType::Triangle)
    };
    tract_ndarray::Array4::from_shape_fn(
        (1, 3, height as usize, width as usize),
        |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
    )
    .into_tensor()
}

/// Tract-based YOLO detector.
///
/// Loads a local ONNX export and decodes its single output tensor. No network
/// I/O; the model file is only read at construction.
pub struct TractBackend {
    model: OnnxPlan,
    width: u32,
    height: u32,
    class_count: usize,
    score_floor: f32,
}

impl TractBackend {
    /// `class_count` must match the label table the outputs are read against.
    pub fn load(
        artifact: &ModelArtifact,
        class_count: usize,
        score_floor: f32,
    ) -> PipelineResult<Self> {
        let model_path = Path::new(&artifact.topology);
        let model = load_onnx_plan(
            "detector",
            model_path,
            artifact.input_width,
            artifact.input_height,
        )?;
        Ok(Self {
            model,
            width: artifact.input_width,
            height: artifact.input_height,
            class_count,
            score_floor,
        })
    }
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, image: &RgbImage) -> PipelineResult<Vec<RawDetection>> {
        let input = image_to_tensor(image, self.width, self.height);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .map_err(|e| PipelineError::Detection(format!("ONNX inference failed: {e:#}")))?;
        let output = outputs
            .first()
            .ok_or_else(|| PipelineError::Detection("model produced no outputs".into()))?;
        let data = output
            .as_slice::<f32>()
            .map_err(|e| PipelineError::Detection(format!("output tensor was not f32: {e:#}")))?;
        let geometry = InputGeometry {
            input_width: self.width,
            input_height: self.height,
            image_width: image.width(),
            image_height: image.height(),
        };
        decode_yolo(
            data,
            output.shape(),
            geometry,
            self.class_count,
            self.score_floor,
        )
    }

    fn warm_up(&mut self) -> PipelineResult<()> {
        let blank = RgbImage::new(self.width, self.height);
        self.detect(&blank).map(|_| ())
    }
}
