//! Streaming sessions.
//!
//! A session owns its frame source and its counters; nothing here is shared
//! between sessions except the read-only `Pipeline`.
//!
//! ```text
//! Init -> OpeningSource -> Streaming <-> Processing -> Closed
//!              |                                          ^
//!              +------------------ open failure ----------+
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::annotate::Overlay;
use crate::encode::multipart_chunk;
use crate::error::PipelineResult;
use crate::frame::Frame;
use crate::ingest::FrameSource;
use crate::pipeline::Pipeline;

const FPS_WINDOW: Duration = Duration::from_secs(1);
const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Throughput and tally state for one session.
#[derive(Clone, Debug)]
pub struct FrameCounters {
    frames_total: u64,
    window_frames: u64,
    window_start: Instant,
    fps: f64,
    label_counts: BTreeMap<String, u64>,
}

impl FrameCounters {
    pub fn new() -> Self {
        Self::starting_at(Instant::now())
    }

    pub fn starting_at(now: Instant) -> Self {
        Self {
            frames_total: 0,
            window_frames: 0,
            window_start: now,
            fps: 0.0,
            label_counts: BTreeMap::new(),
        }
    }

    /// Count one processed frame and its labels. Once the window is older
    /// than one second the FPS estimate is refreshed and the window restarts.
    pub fn record_frame<'a>(&mut self, labels: impl IntoIterator<Item = &'a str>, now: Instant) {
        self.frames_total += 1;
        self.window_frames += 1;
        for label in labels {
            *self.label_counts.entry(label.to_string()).or_insert(0) += 1;
        }
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed > FPS_WINDOW {
            self.fps = self.window_frames as f64 / elapsed.as_secs_f64();
            self.window_frames = 0;
            self.window_start = now;
        }
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn frames_total(&self) -> u64 {
        self.frames_total
    }

    pub fn label_counts(&self) -> &BTreeMap<String, u64> {
        &self.label_counts
    }

    pub fn overlay(&self) -> Overlay {
        Overlay {
            fps: self.fps,
            label_counts: self.label_counts.clone(),
        }
    }
}

impl Default for FrameCounters {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Init,
    OpeningSource,
    Streaming,
    Processing,
    Closed,
}

/// Why a session reached `Closed`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CloseReason {
    OpenFailed(String),
    EndOfInput,
    Cancelled,
    ReadFailed(String),
    FrameFailed(String),
}

pub struct StreamSession {
    id: u64,
    pipeline: Pipeline,
    source: Box<dyn FrameSource>,
    state: SessionState,
    counters: FrameCounters,
    cancel: Arc<AtomicBool>,
    frames_emitted: u64,
    close_reason: Option<CloseReason>,
    last_health_log: Instant,
}

impl StreamSession {
    pub fn new(pipeline: Pipeline, source: Box<dyn FrameSource>) -> Self {
        Self {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            pipeline,
            source,
            state: SessionState::Init,
            counters: FrameCounters::new(),
            cancel: Arc::new(AtomicBool::new(false)),
            frames_emitted: 0,
            close_reason: None,
            last_health_log: Instant::now(),
        }
    }

    /// Share an external stop flag (e.g. server shutdown or client gone).
    pub fn with_cancel_flag(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }

    pub fn counters(&self) -> &FrameCounters {
        &self.counters
    }

    pub fn close_reason(&self) -> Option<&CloseReason> {
        self.close_reason.as_ref()
    }

    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Open the source. On failure the session goes straight to `Closed`
    /// without emitting anything and the error is returned to the caller.
    pub fn open(&mut self) -> PipelineResult<()> {
        if self.state != SessionState::Init {
            return Ok(());
        }
        self.state = SessionState::OpeningSource;
        let opened = self
            .pipeline
            .ensure_stream_ready()
            .and_then(|_| self.source.connect());
        match opened {
            Ok(()) => {
                log::info!(
                    "session {}: streaming from {}",
                    self.id,
                    self.source.describe()
                );
                self.state = SessionState::Streaming;
                self.last_health_log = Instant::now();
                Ok(())
            }
            Err(err) => {
                log::error!("session {}: open failed: {}", self.id, err);
                self.close(CloseReason::OpenFailed(err.to_string()));
                Err(err)
            }
        }
    }

    /// Read, analyse, annotate and encode the next frame into one multipart
    /// chunk. `None` once the session is closed.
    pub fn next_chunk(&mut self) -> Option<Vec<u8>> {
        if self.state != SessionState::Streaming {
            return None;
        }
        if self.cancel.load(Ordering::SeqCst) {
            self.close(CloseReason::Cancelled);
            return None;
        }

        let frame = match self.source.next_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                self.close(CloseReason::EndOfInput);
                return None;
            }
            Err(err) => {
                log::error!("session {}: frame read failed: {}", self.id, err);
                self.close(CloseReason::ReadFailed(err.to_string()));
                return None;
            }
        };

        self.state = SessionState::Processing;
        match self.process(&frame) {
            Ok(chunk) => {
                self.frames_emitted += 1;
                self.state = SessionState::Streaming;
                self.log_health();
                Some(chunk)
            }
            Err(err) => {
                log::error!(
                    "session {}: frame {} failed, ending stream: {}",
                    self.id,
                    frame.index(),
                    err
                );
                self.close(CloseReason::FrameFailed(err.to_string()));
                None
            }
        }
    }

    fn process(&mut self, frame: &Frame) -> PipelineResult<Vec<u8>> {
        let analysis = self.pipeline.analyze(frame)?;
        self.counters.record_frame(
            analysis.detections.iter().map(|d| d.detection.label.as_str()),
            Instant::now(),
        );
        let overlay = self.counters.overlay();
        let jpeg = self.pipeline.render(frame, &analysis, Some(&overlay))?;
        Ok(multipart_chunk(&jpeg, self.frames_emitted + 1))
    }

    fn log_health(&mut self) {
        if self.last_health_log.elapsed() < HEALTH_LOG_INTERVAL {
            return;
        }
        self.last_health_log = Instant::now();
        let stats = self.source.stats();
        log::info!(
            "session {}: frames_emitted={} captured={} fps={:.1} healthy={} labels={:?}",
            self.id,
            self.frames_emitted,
            stats.frames_captured,
            self.counters.fps(),
            self.source.is_healthy(),
            self.counters.label_counts()
        );
    }

    /// Release the source and move to `Closed`. Idempotent.
    pub fn close(&mut self, reason: CloseReason) {
        if self.state == SessionState::Closed {
            return;
        }
        self.source.release();
        log::info!(
            "session {}: closed after {} frames ({:?})",
            self.id,
            self.frames_emitted,
            reason
        );
        self.close_reason = Some(reason);
        self.state = SessionState::Closed;
    }
}

impl Iterator for StreamSession {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk()
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.close(CloseReason::Cancelled);
    }
}
