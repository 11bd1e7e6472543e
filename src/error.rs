//! Error taxonomy shared by every pipeline boundary.
//!
//! Each component (frame source, detector, depth estimator, encoder) returns
//! `Result<_, PipelineError>` so callers decide recovery by variant instead of
//! by convention:
//!
//! - `ModelLoad`: fatal at startup for the affected component only.
//! - `SourceOpen`: fatal for one stream session, no frames are emitted.
//! - `DepthEstimation`: recoverable, the estimator substitutes a zero map.
//! - `Detection` / `Decode`: surfaced to single-shot callers as a JSON error.
//! - everything else inside the stream loop ends the session cleanly.

use thiserror::Error;

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to load {component} model from {artifact}: {reason}")]
    ModelLoad {
        component: &'static str,
        artifact: String,
        reason: String,
    },

    #[error("{0} model is not loaded")]
    ModelUnavailable(&'static str),

    #[error("failed to open frame source {source_id}: {reason}")]
    SourceOpen { source_id: String, reason: String },

    #[error("frame source read failed: {0}")]
    SourceRead(String),

    #[error("depth estimation failed: {0}")]
    DepthEstimation(String),

    #[error("object detection failed: {0}")]
    Detection(String),

    #[error("{0}")]
    Decode(String),

    #[error("frame encoding failed: {0}")]
    Encode(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Stable machine-readable code used in JSON error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::ModelLoad { .. } => "model_load",
            PipelineError::ModelUnavailable(_) => "model_unavailable",
            PipelineError::SourceOpen { .. } => "source_open",
            PipelineError::SourceRead(_) => "source_read",
            PipelineError::DepthEstimation(_) => "depth_estimation",
            PipelineError::Detection(_) => "detection",
            PipelineError::Decode(_) => "decode",
            PipelineError::Encode(_) => "encode",
            PipelineError::Config(_) => "config",
            PipelineError::Io(_) => "io",
        }
    }

    /// True for errors caused by the caller's input rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(self, PipelineError::Decode(_))
    }

    pub(crate) fn model_load(
        component: &'static str,
        artifact: impl Into<String>,
        reason: impl ToString,
    ) -> Self {
        PipelineError::ModelLoad {
            component,
            artifact: artifact.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn source_open(source_id: impl Into<String>, reason: impl ToString) -> Self {
        PipelineError::SourceOpen {
            source_id: source_id.into(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_stable_codes() {
        let err = PipelineError::source_open("/tmp/missing.mp4", "no such file");
        assert_eq!(err.kind(), "source_open");
        assert!(err.to_string().contains("/tmp/missing.mp4"));

        let err = PipelineError::Decode("no image file provided".into());
        assert_eq!(err.kind(), "decode");
        assert!(err.is_client_error());
        assert_eq!(err.to_string(), "no image file provided");
    }
}
