use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::RgbImage;

use proximity_guard::detect::{DetectorBackend, DetectorSettings, LabelTable, RawDetection};
use proximity_guard::ingest::SourceStats;
use proximity_guard::{
    build_source, CaptureSettings, CloseReason, DepthEstimator, Frame, FrameSource, ModelArtifact,
    ObjectDetector, Pipeline, PipelineConfig, PipelineError, PipelineResult, SessionState,
    SourceSelector, StreamSession,
};

fn stub_config(source: SourceSelector) -> PipelineConfig {
    PipelineConfig {
        source,
        detector: ModelArtifact::stub("scene", 640),
        depth: ModelArtifact::stub("ramp", 256),
        capture: CaptureSettings {
            width: 160,
            height: 120,
            target_fps: 0,
        },
        ..PipelineConfig::default()
    }
}

fn session_for(config: PipelineConfig) -> StreamSession {
    let source = build_source(&config.source, &config.capture).expect("build source");
    StreamSession::new(Pipeline::from_config(config), source)
}

#[test]
fn streams_until_end_of_input() {
    let mut session = session_for(stub_config(SourceSelector::Synthetic("walk?frames=3".into())));
    assert_eq!(session.state(), SessionState::Init);
    session.open().expect("open");
    assert_eq!(session.state(), SessionState::Streaming);

    let chunks: Vec<Vec<u8>> = session.by_ref().collect();
    assert_eq!(chunks.len(), 3);
    for chunk in &chunks {
        assert!(chunk.starts_with(b"--frame\r\n"));
        let text = String::from_utf8_lossy(&chunk[..80.min(chunk.len())]).to_string();
        assert!(text.contains("Content-Type: image/jpeg"));
    }

    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(session.close_reason(), Some(&CloseReason::EndOfInput));
    assert_eq!(session.frames_emitted(), 3);
    assert_eq!(session.counters().frames_total(), 3);
    assert_eq!(session.counters().label_counts().get("person"), Some(&3));
    assert_eq!(session.counters().label_counts().get("cell phone"), None);
    assert!(session.next_chunk().is_none());
}

#[test]
fn open_failure_closes_without_frames() {
    let missing = PathBuf::from("/nonexistent/proximity-guard/clip.png");
    let mut session = session_for(stub_config(SourceSelector::File(missing)));
    let err = session.open().expect_err("missing file");
    assert_eq!(err.kind(), "source_open");
    assert_eq!(session.state(), SessionState::Closed);
    assert!(matches!(session.close_reason(), Some(CloseReason::OpenFailed(_))));
    assert!(session.next_chunk().is_none());
    assert_eq!(session.frames_emitted(), 0);
}

#[test]
fn streaming_refuses_to_start_without_models() {
    let config = stub_config(SourceSelector::Synthetic("walk".into()));
    let source = build_source(&config.source, &config.capture).expect("build source");
    let mut session = StreamSession::new(Pipeline::new(config, None, None), source);
    let err = session.open().expect_err("no models");
    assert_eq!(err.kind(), "model_unavailable");
    assert_eq!(session.state(), SessionState::Closed);
}

#[test]
fn cancellation_ends_the_session() {
    let mut session = session_for(stub_config(SourceSelector::Synthetic("walk".into())));
    session.open().expect("open");
    assert!(session.next_chunk().is_some());
    assert!(session.next_chunk().is_some());

    session.cancel_handle().store(true, Ordering::SeqCst);
    assert!(session.next_chunk().is_none());
    assert_eq!(session.close_reason(), Some(&CloseReason::Cancelled));
    assert_eq!(session.frames_emitted(), 2);
}

#[test]
fn failing_depth_model_still_streams() {
    let mut config = stub_config(SourceSelector::Synthetic("walk?frames=2".into()));
    config.depth = ModelArtifact::stub("failing", 256);
    let mut session = session_for(config);
    session.open().expect("open");
    assert_eq!(session.by_ref().count(), 2);
    assert_eq!(session.close_reason(), Some(&CloseReason::EndOfInput));
}

#[test]
fn sessions_do_not_share_counters() {
    let config = stub_config(SourceSelector::Synthetic("walk?frames=4".into()));
    let mut first = session_for(config.clone());
    let mut second = session_for(config);
    first.open().expect("open first");
    second.open().expect("open second");
    assert_ne!(first.id(), second.id());

    assert_eq!(first.by_ref().count(), 4);
    assert!(second.next_chunk().is_some());
    assert_eq!(first.counters().frames_total(), 4);
    assert_eq!(second.counters().frames_total(), 1);
}

/// Source that yields one frame, then fails; counts releases.
struct FlakySource {
    served: u64,
    releases: Arc<AtomicUsize>,
}

impl FrameSource for FlakySource {
    fn describe(&self) -> String {
        "flaky".into()
    }

    fn connect(&mut self) -> PipelineResult<()> {
        Ok(())
    }

    fn next_frame(&mut self) -> PipelineResult<Option<Frame>> {
        self.served += 1;
        if self.served > 1 {
            return Err(PipelineError::SourceRead("device unplugged".into()));
        }
        Ok(Some(Frame::from_image(RgbImage::new(64, 48))))
    }

    fn is_healthy(&self) -> bool {
        self.served <= 1
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.served,
            source: self.describe(),
        }
    }

    fn release(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn read_failure_releases_source_once() {
    let releases = Arc::new(AtomicUsize::new(0));
    let source = FlakySource {
        served: 0,
        releases: releases.clone(),
    };
    let config = stub_config(SourceSelector::Synthetic("unused".into()));
    let mut session = StreamSession::new(Pipeline::from_config(config), Box::new(source));
    session.open().expect("open");
    assert!(session.next_chunk().is_some());
    assert!(session.next_chunk().is_none());
    assert!(matches!(session.close_reason(), Some(CloseReason::ReadFailed(_))));
    assert_eq!(releases.load(Ordering::SeqCst), 1);
    drop(session);
    assert_eq!(releases.load(Ordering::SeqCst), 1);
}

#[test]
fn dropping_an_open_session_releases_the_source() {
    let releases = Arc::new(AtomicUsize::new(0));
    let source = FlakySource {
        served: 0,
        releases: releases.clone(),
    };
    let config = stub_config(SourceSelector::Synthetic("unused".into()));
    let mut session = StreamSession::new(Pipeline::from_config(config), Box::new(source));
    session.open().expect("open");
    drop(session);
    assert_eq!(releases.load(Ordering::SeqCst), 1);
}

struct ExplodingDetector;

impl DetectorBackend for ExplodingDetector {
    fn name(&self) -> &'static str {
        "exploding"
    }

    fn detect(&mut self, _image: &RgbImage) -> PipelineResult<Vec<RawDetection>> {
        Err(PipelineError::Detection("accelerator reset".into()))
    }
}

#[test]
fn per_frame_failure_ends_stream_cleanly() {
    let config = stub_config(SourceSelector::Synthetic("walk".into()));
    let detector = ObjectDetector::new(
        Box::new(ExplodingDetector),
        LabelTable::coco(),
        DetectorSettings::from_config(&config),
    );
    let depth = DepthEstimator::load(&config.depth).expect("stub depth");
    let source = build_source(&config.source, &config.capture).expect("build source");
    let mut session = StreamSession::new(Pipeline::new(config, Some(detector), Some(depth)), source);
    session.open().expect("open");
    assert!(session.next_chunk().is_none());
    assert_eq!(session.state(), SessionState::Closed);
    assert!(matches!(session.close_reason(), Some(CloseReason::FrameFailed(_))));
    assert_eq!(session.frames_emitted(), 0);
}
