pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use stub::StubBackend;

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;

use crate::config::ModelArtifact;
use crate::detect::backend::DetectorBackend;
use crate::error::PipelineResult;

/// Pick a backend for `artifact`: `stub://` topologies get the stub, anything
/// else is treated as an ONNX file whose outputs carry `class_count` classes.
pub fn load_backend(
    artifact: &ModelArtifact,
    class_count: usize,
    score_floor: f32,
) -> PipelineResult<Box<dyn DetectorBackend>> {
    if artifact.is_stub() {
        let backend = if artifact.topology == "stub://empty" {
            StubBackend::empty()
        } else {
            StubBackend::new()
        };
        return Ok(Box::new(backend));
    }
    artifact.check_loadable("detector")?;
    load_onnx(artifact, class_count, score_floor)
}

#[cfg(feature = "backend-tract")]
fn load_onnx(
    artifact: &ModelArtifact,
    class_count: usize,
    score_floor: f32,
) -> PipelineResult<Box<dyn DetectorBackend>> {
    Ok(Box::new(TractBackend::load(artifact, class_count, score_floor)?))
}

#[cfg(not(feature = "backend-tract"))]
fn load_onnx(
    artifact: &ModelArtifact,
    _class_count: usize,
    _score_floor: f32,
) -> PipelineResult<Box<dyn DetectorBackend>> {
    Err(crate::error::PipelineError::model_load(
        "detector",
        artifact.topology.clone(),
        "ONNX inference requires the backend-tract feature",
    ))
}
