use std::sync::Mutex;

use tempfile::Builder;

use proximity_guard::{PipelineConfig, SourceSelector};

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "GUARD_CONFIG",
        "GUARD_SOURCE",
        "GUARD_CONFIDENCE",
        "GUARD_BLUR_KERNEL",
        "GUARD_DEVICE",
        "GUARD_API_ADDR",
        "GUARD_DETECTOR_MODEL",
        "GUARD_DEPTH_MODEL",
        "GUARD_SUPPRESSED_LABELS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = PipelineConfig::load().expect("load defaults");
    assert_eq!(cfg.source, SourceSelector::Camera(0));
    assert_eq!(cfg.confidence_threshold, 0.5);
    assert_eq!(cfg.blur_kernel, 5);
    assert_eq!(cfg.suppressed_labels, vec!["cell phone".to_string()]);
    assert_eq!(cfg.detector.device, "CPU");
    assert_eq!(cfg.api_addr, "127.0.0.1:8090");
}

#[test]
fn loads_toml_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".toml").tempfile().expect("temp config");
    let toml = r#"
source = "clips/crossing.mp4"
confidence_threshold = 0.4
blur_kernel = 7
suppressed_labels = ["cell phone", "tv"]
jpeg_quality = 70

[detector]
topology = "models/yolov8s.onnx"
input_width = 320
input_height = 320

[depth]
topology = "stub://ramp"

[capture]
width = 800
height = 600
target_fps = 10

[api]
addr = "0.0.0.0:9000"
"#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");

    std::env::set_var("GUARD_CONFIG", file.path());
    std::env::set_var("GUARD_CONFIDENCE", "0.65");
    std::env::set_var("GUARD_SOURCE", "stub://crossing?frames=5");

    let cfg = PipelineConfig::load().expect("load config");
    assert_eq!(cfg.source, SourceSelector::Synthetic("crossing?frames=5".into()));
    assert_eq!(cfg.confidence_threshold, 0.65);
    assert_eq!(cfg.blur_kernel, 7);
    assert_eq!(cfg.suppressed_labels.len(), 2);
    assert_eq!(cfg.jpeg_quality, 70);
    assert_eq!(cfg.detector.topology, "models/yolov8s.onnx");
    assert_eq!((cfg.detector.input_width, cfg.detector.input_height), (320, 320));
    assert!(cfg.depth.is_stub());
    assert_eq!(cfg.capture.target_fps, 10);
    assert_eq!(cfg.api_addr, "0.0.0.0:9000");

    clear_env();
}

#[test]
fn json_config_files_are_accepted() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".json").tempfile().expect("temp config");
    let json = r#"{ "source": "2", "blur_kernel": 0, "depth": { "device": "cpu" } }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    let cfg = PipelineConfig::load_from(Some(file.path())).expect("load config");
    assert_eq!(cfg.source, SourceSelector::Camera(2));
    assert_eq!(cfg.blur_kernel, 0);
    assert_eq!(cfg.depth.device, "cpu");
}

#[test]
fn rejects_invalid_values_at_load_time() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("GUARD_CONFIDENCE", "0");
    let err = PipelineConfig::load().expect_err("zero threshold");
    assert_eq!(err.kind(), "config");

    std::env::set_var("GUARD_CONFIDENCE", "1.5");
    assert!(PipelineConfig::load().is_err());

    std::env::set_var("GUARD_CONFIDENCE", "1.0");
    assert!(PipelineConfig::load().is_ok());

    std::env::set_var("GUARD_BLUR_KERNEL", "4");
    assert!(PipelineConfig::load().is_err());

    std::env::set_var("GUARD_BLUR_KERNEL", "-3");
    assert!(PipelineConfig::load().is_err());
    clear_env();

    std::env::set_var("GUARD_SOURCE", "rtsp://camera-1/stream");
    assert!(PipelineConfig::load().is_err());
    clear_env();
}

#[test]
fn rejects_unknown_file_keys() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".toml").tempfile().expect("temp config");
    std::io::Write::write_all(&mut file, b"blur_radius = 3\n").expect("write config");
    let err = PipelineConfig::load_from(Some(file.path())).expect_err("unknown key");
    assert_eq!(err.kind(), "config");
}
