use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::error::{PipelineError, PipelineResult};

const DEFAULT_SOURCE: &str = "0";
const DEFAULT_DETECTOR_MODEL: &str = "models/yolov8n.onnx";
const DEFAULT_DEPTH_MODEL: &str = "models/midas_v21_small_256.onnx";
const DEFAULT_DEVICE: &str = "CPU";
const DEFAULT_CONFIDENCE: f32 = 0.5;
const DEFAULT_BLUR_KERNEL: u32 = 5;
const DEFAULT_SUPPRESSED_LABEL: &str = "cell phone";
const DEFAULT_DETECTOR_INPUT: u32 = 640;
const DEFAULT_DEPTH_INPUT: u32 = 256;
const DEFAULT_JPEG_QUALITY: u8 = 80;
const DEFAULT_CAPTURE_WIDTH: u32 = 640;
const DEFAULT_CAPTURE_HEIGHT: u32 = 480;
const DEFAULT_CAPTURE_FPS: u32 = 15;
const DEFAULT_API_ADDR: &str = "127.0.0.1:8090";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PipelineConfigFile {
    source: Option<String>,
    confidence_threshold: Option<f32>,
    blur_kernel: Option<u32>,
    suppressed_labels: Option<Vec<String>>,
    labels_path: Option<PathBuf>,
    jpeg_quality: Option<u8>,
    detector: Option<ModelConfigFile>,
    depth: Option<ModelConfigFile>,
    capture: Option<CaptureConfigFile>,
    api: Option<ApiConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ModelConfigFile {
    topology: Option<String>,
    weights: Option<PathBuf>,
    device: Option<String>,
    input_width: Option<u32>,
    input_height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CaptureConfigFile {
    width: Option<u32>,
    height: Option<u32>,
    target_fps: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ApiConfigFile {
    addr: Option<String>,
}

/// Where frames come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceSelector {
    /// Local camera by index (`/dev/video<N>`).
    Camera(u32),
    /// Local still image, image directory or video file.
    File(PathBuf),
    /// Synthetic scene (`stub://<name>`), used for tests and demos.
    Synthetic(String),
}

impl SourceSelector {
    pub fn parse(raw: &str) -> PipelineResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(PipelineError::Config("source must not be empty".into()));
        }
        if let Some(name) = raw.strip_prefix("stub://") {
            return Ok(SourceSelector::Synthetic(name.to_string()));
        }
        if raw.chars().all(|c| c.is_ascii_digit()) {
            let index = raw
                .parse::<u32>()
                .map_err(|_| PipelineError::Config(format!("camera index out of range: {raw}")))?;
            return Ok(SourceSelector::Camera(index));
        }
        if raw.contains("://") {
            return Err(PipelineError::Config(format!(
                "source '{raw}' must be a camera index, local path or stub:// name (no URL schemes)"
            )));
        }
        Ok(SourceSelector::File(PathBuf::from(raw)))
    }

    pub fn describe(&self) -> String {
        match self {
            SourceSelector::Camera(index) => format!("camera:{index}"),
            SourceSelector::File(path) => path.display().to_string(),
            SourceSelector::Synthetic(name) => format!("stub://{name}"),
        }
    }
}

/// A model artifact pair plus the compute device it should be compiled for.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelArtifact {
    /// Graph topology location, or `stub://<name>` for the in-process stub.
    pub topology: String,
    /// Weights half of a topology/weights pair. ONNX graphs carry their own
    /// weights, so the tract backends never read this file; a declared path
    /// must still exist and is reported as unused at load.
    pub weights: Option<PathBuf>,
    pub device: String,
    pub input_width: u32,
    pub input_height: u32,
}

impl ModelArtifact {
    fn with_defaults(topology: &str, input: u32) -> Self {
        Self {
            topology: topology.to_string(),
            weights: None,
            device: DEFAULT_DEVICE.to_string(),
            input_width: input,
            input_height: input,
        }
    }

    pub fn stub(name: &str, input: u32) -> Self {
        Self::with_defaults(&format!("stub://{name}"), input)
    }

    pub fn is_stub(&self) -> bool {
        self.topology.starts_with("stub://")
    }

    /// Checks made before handing a file-backed artifact to the runtime:
    /// only the CPU device is available, and every declared file must exist.
    pub fn check_loadable(&self, component: &'static str) -> PipelineResult<()> {
        if !self.device.eq_ignore_ascii_case(DEFAULT_DEVICE) {
            return Err(PipelineError::model_load(
                component,
                self.topology.clone(),
                format!("device '{}' is not available (only CPU)", self.device),
            ));
        }
        if !Path::new(&self.topology).is_file() {
            return Err(PipelineError::model_load(
                component,
                self.topology.clone(),
                "model file not found",
            ));
        }
        if let Some(weights) = &self.weights {
            if !weights.is_file() {
                return Err(PipelineError::model_load(
                    component,
                    self.topology.clone(),
                    format!("weights file {} not found", weights.display()),
                ));
            }
            log::warn!(
                "{} model {} embeds its weights; ignoring {}",
                component,
                self.topology,
                weights.display()
            );
        }
        Ok(())
    }

    fn merge(mut self, file: Option<ModelConfigFile>) -> Self {
        let Some(file) = file else {
            return self;
        };
        if let Some(topology) = file.topology {
            self.topology = topology;
        }
        if file.weights.is_some() {
            self.weights = file.weights;
        }
        if let Some(device) = file.device {
            self.device = device;
        }
        if let Some(w) = file.input_width {
            self.input_width = w;
        }
        if let Some(h) = file.input_height {
            self.input_height = h;
        }
        self
    }

    fn validate(&self, component: &str) -> PipelineResult<()> {
        if self.topology.trim().is_empty() {
            return Err(PipelineError::Config(format!(
                "{component} model topology must be set"
            )));
        }
        if self.device.trim().is_empty() {
            return Err(PipelineError::Config(format!(
                "{component} device id must not be empty"
            )));
        }
        if self.input_width == 0 || self.input_height == 0 {
            return Err(PipelineError::Config(format!(
                "{component} model input size must be positive"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSettings {
    pub width: u32,
    pub height: u32,
    pub target_fps: u32,
}

/// Immutable pipeline configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub source: SourceSelector,
    pub detector: ModelArtifact,
    pub depth: ModelArtifact,
    pub confidence_threshold: f32,
    /// Gaussian smoothing kernel size applied before detection; 0 disables.
    pub blur_kernel: u32,
    pub suppressed_labels: Vec<String>,
    pub labels_path: Option<PathBuf>,
    pub jpeg_quality: u8,
    pub capture: CaptureSettings,
    pub api_addr: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            source: SourceSelector::Camera(0),
            detector: ModelArtifact::with_defaults(DEFAULT_DETECTOR_MODEL, DEFAULT_DETECTOR_INPUT),
            depth: ModelArtifact::with_defaults(DEFAULT_DEPTH_MODEL, DEFAULT_DEPTH_INPUT),
            confidence_threshold: DEFAULT_CONFIDENCE,
            blur_kernel: DEFAULT_BLUR_KERNEL,
            suppressed_labels: vec![DEFAULT_SUPPRESSED_LABEL.to_string()],
            labels_path: None,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            capture: CaptureSettings {
                width: DEFAULT_CAPTURE_WIDTH,
                height: DEFAULT_CAPTURE_HEIGHT,
                target_fps: DEFAULT_CAPTURE_FPS,
            },
            api_addr: DEFAULT_API_ADDR.to_string(),
        }
    }
}

impl PipelineConfig {
    /// Load from `GUARD_CONFIG` (if set), apply env overrides, validate.
    pub fn load() -> PipelineResult<Self> {
        let path = std::env::var("GUARD_CONFIG").ok();
        Self::load_from(path.as_deref().map(Path::new))
    }

    /// Load from an explicit file (or defaults), apply env overrides, validate.
    pub fn load_from(path: Option<&Path>) -> PipelineResult<Self> {
        let file_cfg = match path {
            Some(path) => read_config_file(path)?,
            None => PipelineConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_toml_str(raw: &str) -> PipelineResult<Self> {
        let file: PipelineConfigFile =
            toml::from_str(raw).map_err(|e| PipelineError::Config(e.to_string()))?;
        let cfg = Self::from_file(file)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_str(raw: &str) -> PipelineResult<Self> {
        let file: PipelineConfigFile =
            serde_json::from_str(raw).map_err(|e| PipelineError::Config(e.to_string()))?;
        let cfg = Self::from_file(file)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PipelineConfigFile) -> PipelineResult<Self> {
        let defaults = Self::default();
        let source = SourceSelector::parse(file.source.as_deref().unwrap_or(DEFAULT_SOURCE))?;
        let capture = CaptureSettings {
            width: file
                .capture
                .as_ref()
                .and_then(|c| c.width)
                .unwrap_or(defaults.capture.width),
            height: file
                .capture
                .as_ref()
                .and_then(|c| c.height)
                .unwrap_or(defaults.capture.height),
            target_fps: file
                .capture
                .as_ref()
                .and_then(|c| c.target_fps)
                .unwrap_or(defaults.capture.target_fps),
        };
        Ok(Self {
            source,
            detector: defaults.detector.merge(file.detector),
            depth: defaults.depth.merge(file.depth),
            confidence_threshold: file
                .confidence_threshold
                .unwrap_or(defaults.confidence_threshold),
            blur_kernel: file.blur_kernel.unwrap_or(defaults.blur_kernel),
            suppressed_labels: file
                .suppressed_labels
                .unwrap_or(defaults.suppressed_labels),
            labels_path: file.labels_path,
            jpeg_quality: file.jpeg_quality.unwrap_or(defaults.jpeg_quality),
            capture,
            api_addr: file
                .api
                .and_then(|api| api.addr)
                .unwrap_or(defaults.api_addr),
        })
    }

    fn apply_env(&mut self) -> PipelineResult<()> {
        if let Some(source) = env_value("GUARD_SOURCE") {
            self.source = SourceSelector::parse(&source)?;
        }
        if let Some(raw) = env_value("GUARD_CONFIDENCE") {
            self.confidence_threshold = raw.parse().map_err(|_| {
                PipelineError::Config("GUARD_CONFIDENCE must be a number in (0, 1]".into())
            })?;
        }
        if let Some(raw) = env_value("GUARD_BLUR_KERNEL") {
            self.blur_kernel = raw.parse().map_err(|_| {
                PipelineError::Config("GUARD_BLUR_KERNEL must be a non-negative integer".into())
            })?;
        }
        if let Some(device) = env_value("GUARD_DEVICE") {
            self.detector.device = device.clone();
            self.depth.device = device;
        }
        if let Some(model) = env_value("GUARD_DETECTOR_MODEL") {
            self.detector.topology = model;
        }
        if let Some(model) = env_value("GUARD_DEPTH_MODEL") {
            self.depth.topology = model;
        }
        if let Some(addr) = env_value("GUARD_API_ADDR") {
            self.api_addr = addr;
        }
        if let Some(labels) = env_value("GUARD_SUPPRESSED_LABELS") {
            self.suppressed_labels = split_csv(&labels);
        }
        Ok(())
    }

    fn validate(&self) -> PipelineResult<()> {
        let threshold = self.confidence_threshold;
        if !(threshold > 0.0 && threshold <= 1.0) {
            return Err(PipelineError::Config(format!(
                "confidence_threshold must be in (0, 1], got {threshold}"
            )));
        }
        if self.blur_kernel != 0 && self.blur_kernel % 2 == 0 {
            return Err(PipelineError::Config(format!(
                "blur_kernel must be 0 (disabled) or odd, got {}",
                self.blur_kernel
            )));
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(PipelineError::Config(
                "jpeg_quality must be between 1 and 100".into(),
            ));
        }
        if self.capture.width == 0 || self.capture.height == 0 {
            return Err(PipelineError::Config(
                "capture width and height must be positive".into(),
            ));
        }
        self.detector.validate("detector")?;
        self.depth.validate("depth")?;
        self.api_addr.parse::<SocketAddr>().map_err(|e| {
            PipelineError::Config(format!("api addr '{}' is invalid: {}", self.api_addr, e))
        })?;
        Ok(())
    }
}

fn read_config_file(path: &Path) -> PipelineResult<PipelineConfigFile> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        PipelineError::Config(format!(
            "failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let parsed = if is_toml {
        toml::from_str(&raw).map_err(|e| e.to_string())
    } else {
        serde_json::from_str(&raw).map_err(|e| e.to_string())
    };
    parsed.map_err(|e| {
        PipelineError::Config(format!("invalid config file {}: {}", path.display(), e))
    })
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
