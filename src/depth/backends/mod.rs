pub mod stub;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use stub::{FailingDepthBackend, StubDepthBackend};

#[cfg(feature = "backend-tract")]
pub use tract::TractDepthBackend;

use crate::config::ModelArtifact;
use crate::depth::backend::DepthBackend;
use crate::error::PipelineResult;

/// `stub://failing` always errors; other `stub://` names give the ramp.
pub fn load_backend(artifact: &ModelArtifact) -> PipelineResult<Box<dyn DepthBackend>> {
    if artifact.is_stub() {
        if artifact.topology == "stub://failing" {
            return Ok(Box::new(FailingDepthBackend));
        }
        return Ok(Box::new(StubDepthBackend));
    }
    artifact.check_loadable("depth")?;
    load_onnx(artifact)
}

#[cfg(feature = "backend-tract")]
fn load_onnx(artifact: &ModelArtifact) -> PipelineResult<Box<dyn DepthBackend>> {
    Ok(Box::new(TractDepthBackend::load(artifact)?))
}

#[cfg(not(feature = "backend-tract"))]
fn load_onnx(artifact: &ModelArtifact) -> PipelineResult<Box<dyn DepthBackend>> {
    Err(crate::error::PipelineError::model_load(
        "depth",
        artifact.topology.clone(),
        "ONNX inference requires the backend-tract feature",
    ))
}
