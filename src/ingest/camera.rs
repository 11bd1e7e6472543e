//! Local camera frame source.
//!
//! Cameras are selected by index and map to `/dev/video<N>`. Capture uses
//! V4L2 memory-mapped streaming (feature: ingest-v4l2); buffers are
//! converted to RGB24 in-memory. Without the feature, opening a camera fails
//! with a `SourceOpen` error instead of yielding frames.

use super::{FrameSource, SourceStats};
use crate::config::CaptureSettings;
use crate::error::{PipelineError, PipelineResult};
use crate::frame::Frame;

/// Camera frame source.
pub struct CameraSource {
    index: u32,
    #[cfg_attr(not(feature = "ingest-v4l2"), allow(dead_code))]
    capture: CaptureSettings,
    #[cfg(feature = "ingest-v4l2")]
    device: Option<device::DeviceCapture>,
    frame_count: u64,
    #[cfg_attr(not(feature = "ingest-v4l2"), allow(dead_code))]
    last_error: Option<String>,
}

impl CameraSource {
    pub fn new(index: u32, capture: CaptureSettings) -> Self {
        Self {
            index,
            capture,
            #[cfg(feature = "ingest-v4l2")]
            device: None,
            frame_count: 0,
            last_error: None,
        }
    }

    fn device_path(&self) -> String {
        format!("/dev/video{}", self.index)
    }
}

impl FrameSource for CameraSource {
    fn describe(&self) -> String {
        format!("camera:{} ({})", self.index, self.device_path())
    }

    #[cfg(feature = "ingest-v4l2")]
    fn connect(&mut self) -> PipelineResult<()> {
        match device::DeviceCapture::open(&self.device_path(), &self.capture) {
            Ok(capture) => {
                log::info!(
                    "CameraSource: connected to {} ({}x{})",
                    self.device_path(),
                    capture.width(),
                    capture.height()
                );
                self.device = Some(capture);
                self.last_error = None;
                Ok(())
            }
            Err(err) => {
                self.last_error = Some(format!("{err:#}"));
                Err(PipelineError::source_open(
                    self.describe(),
                    format!("{err:#}"),
                ))
            }
        }
    }

    #[cfg(not(feature = "ingest-v4l2"))]
    fn connect(&mut self) -> PipelineResult<()> {
        let reason = "camera capture requires the ingest-v4l2 feature";
        self.last_error = Some(reason.to_string());
        Err(PipelineError::source_open(self.describe(), reason))
    }

    #[cfg(feature = "ingest-v4l2")]
    fn next_frame(&mut self) -> PipelineResult<Option<Frame>> {
        let device = self
            .device
            .as_mut()
            .ok_or_else(|| PipelineError::SourceRead("camera not connected".into()))?;
        match device.capture() {
            Ok(frame) => {
                self.frame_count += 1;
                Ok(Some(frame.with_index(self.frame_count)))
            }
            Err(err) => {
                self.last_error = Some(format!("{err:#}"));
                Err(PipelineError::SourceRead(format!("{err:#}")))
            }
        }
    }

    #[cfg(not(feature = "ingest-v4l2"))]
    fn next_frame(&mut self) -> PipelineResult<Option<Frame>> {
        Err(PipelineError::SourceRead("camera not connected".into()))
    }

    fn is_healthy(&self) -> bool {
        #[cfg(feature = "ingest-v4l2")]
        {
            self.device.is_some() && self.last_error.is_none()
        }
        #[cfg(not(feature = "ingest-v4l2"))]
        {
            false
        }
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.describe(),
        }
    }

    fn release(&mut self) {
        #[cfg(feature = "ingest-v4l2")]
        if self.device.take().is_some() {
            log::info!("CameraSource: released {}", self.device_path());
        }
    }
}

#[cfg(feature = "ingest-v4l2")]
mod device {
    use anyhow::{anyhow, Context, Result};
    use ouroboros::self_referencing;

    use super::super::normalize::{normalize_to_rgb, PixelFormat};
    use crate::config::CaptureSettings;
    use crate::frame::Frame;

    #[self_referencing]
    struct StreamState {
        device: v4l::Device,
        #[borrows(mut device)]
        #[covariant]
        stream: v4l::prelude::MmapStream<'this, v4l::Device>,
    }

    enum Encoding {
        Raw(PixelFormat),
        Mjpeg,
    }

    pub(super) struct DeviceCapture {
        state: StreamState,
        encoding: Encoding,
        width: u32,
        height: u32,
    }

    impl DeviceCapture {
        pub(super) fn open(path: &str, capture: &CaptureSettings) -> Result<Self> {
            use v4l::buffer::Type;
            use v4l::video::Capture;

            let device =
                v4l::Device::with_path(path).with_context(|| format!("open v4l2 device {path}"))?;
            let mut format = device.format().context("read v4l2 format")?;
            format.width = capture.width;
            format.height = capture.height;
            format.fourcc = v4l::FourCC::new(b"YUYV");

            let format = match device.set_format(&format) {
                Ok(format) => format,
                Err(err) => {
                    log::warn!("CameraSource: failed to set format on {}: {}", path, err);
                    device
                        .format()
                        .context("read v4l2 format after set failure")?
                }
            };

            if capture.target_fps > 0 {
                let params = v4l::video::capture::Parameters::with_fps(capture.target_fps);
                if let Err(err) = device.set_params(&params) {
                    log::warn!("CameraSource: failed to set fps on {}: {}", path, err);
                }
            }

            let encoding = if &format.fourcc.repr == b"MJPG" {
                Encoding::Mjpeg
            } else {
                let pixel = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
                    anyhow!("unsupported camera pixel format {}", format.fourcc)
                })?;
                Encoding::Raw(pixel)
            };

            let state = StreamStateTryBuilder {
                device,
                stream_builder: |device| {
                    v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                        .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
                },
            }
            .try_build()?;

            Ok(Self {
                state,
                encoding,
                width: format.width,
                height: format.height,
            })
        }

        pub(super) fn width(&self) -> u32 {
            self.width
        }

        pub(super) fn height(&self) -> u32 {
            self.height
        }

        pub(super) fn capture(&mut self) -> Result<Frame> {
            use v4l::io::traits::CaptureStream;

            let buffer = self
                .state
                .with_stream_mut(|stream| stream.next().map(|(buf, _meta)| buf.to_vec()))
                .context("capture v4l2 frame")?;

            match self.encoding {
                Encoding::Raw(pixel) => {
                    let rgb = normalize_to_rgb(&buffer, self.width, self.height, pixel)?;
                    Frame::from_rgb(rgb, self.width, self.height).map_err(anyhow::Error::new)
                }
                Encoding::Mjpeg => Frame::decode(&buffer).map_err(anyhow::Error::new),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_camera_fails_to_open() {
        let capture = CaptureSettings {
            width: 640,
            height: 480,
            target_fps: 15,
        };
        let mut source = CameraSource::new(97, capture);
        let err = source.connect().unwrap_err();
        assert_eq!(err.kind(), "source_open");
        assert!(!source.is_healthy());
        assert!(source.next_frame().is_err());
        source.release();
    }
}
