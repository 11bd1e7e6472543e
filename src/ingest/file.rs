//! Local file frame source.
//!
//! This module provides `FileSource` for ingesting frames from local files:
//! - a single still image (JPEG/PNG) yields exactly one frame
//! - a directory of images yields one frame per image, in file-name order
//! - any other file is treated as video and decoded with FFmpeg
//!   (feature: ingest-file-ffmpeg)
//!
//! The file source MUST NOT fetch remote URLs; the source selector already
//! rejects URL schemes.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use super::{FrameSource, SourceStats};
#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use crate::error::{PipelineError, PipelineResult};
use crate::frame::Frame;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Local file frame source.
pub struct FileSource {
    path: PathBuf,
    #[cfg_attr(not(feature = "ingest-file-ffmpeg"), allow(dead_code))]
    target_fps: u32,
    backend: Option<FileBackend>,
    frame_count: u64,
    last_error: Option<String>,
}

enum FileBackend {
    Still(Option<PathBuf>),
    Directory(VecDeque<PathBuf>),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Video(FfmpegFileSource),
}

impl FileSource {
    pub fn new(path: PathBuf, target_fps: u32) -> Self {
        Self {
            path,
            target_fps,
            backend: None,
            frame_count: 0,
            last_error: None,
        }
    }

    fn open_backend(&self) -> PipelineResult<FileBackend> {
        let describe = self.path.display().to_string();
        let metadata = std::fs::metadata(&self.path)
            .map_err(|e| PipelineError::source_open(&describe, e))?;

        if metadata.is_dir() {
            let mut entries = Vec::new();
            for entry in std::fs::read_dir(&self.path)
                .map_err(|e| PipelineError::source_open(&describe, e))?
            {
                let entry = entry.map_err(|e| PipelineError::source_open(&describe, e))?;
                let path = entry.path();
                if path.is_file() && is_image_path(&path) {
                    entries.push(path);
                }
            }
            if entries.is_empty() {
                return Err(PipelineError::source_open(
                    describe,
                    "directory contains no JPEG/PNG images",
                ));
            }
            entries.sort();
            return Ok(FileBackend::Directory(entries.into()));
        }

        if is_image_path(&self.path) {
            return Ok(FileBackend::Still(Some(self.path.clone())));
        }

        #[cfg(feature = "ingest-file-ffmpeg")]
        {
            let video = FfmpegFileSource::open(&self.path, self.target_fps)
                .map_err(|e| PipelineError::source_open(&describe, format!("{e:#}")))?;
            Ok(FileBackend::Video(video))
        }
        #[cfg(not(feature = "ingest-file-ffmpeg"))]
        {
            Err(PipelineError::source_open(
                describe,
                "video decoding requires the ingest-file-ffmpeg feature",
            ))
        }
    }

    fn read_image(&mut self, path: &Path) -> PipelineResult<Frame> {
        let bytes = std::fs::read(path).map_err(|e| {
            PipelineError::SourceRead(format!("failed to read {}: {}", path.display(), e))
        })?;
        let frame = Frame::decode(&bytes).map_err(|e| {
            PipelineError::SourceRead(format!("failed to decode {}: {}", path.display(), e))
        })?;
        self.frame_count += 1;
        Ok(frame.with_index(self.frame_count))
    }
}

impl FrameSource for FileSource {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    fn connect(&mut self) -> PipelineResult<()> {
        match self.open_backend() {
            Ok(backend) => {
                self.backend = Some(backend);
                self.last_error = None;
                log::info!("FileSource: connected to {}", self.path.display());
                Ok(())
            }
            Err(err) => {
                self.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    fn next_frame(&mut self) -> PipelineResult<Option<Frame>> {
        let next_path = match self.backend.as_mut() {
            None => {
                return Err(PipelineError::SourceRead(format!(
                    "{} is not open",
                    self.path.display()
                )))
            }
            Some(FileBackend::Still(pending)) => pending.take(),
            Some(FileBackend::Directory(entries)) => entries.pop_front(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            Some(FileBackend::Video(video)) => {
                let result = video.next_frame();
                return match result {
                    Ok(Some(frame)) => {
                        self.frame_count += 1;
                        Ok(Some(frame.with_index(self.frame_count)))
                    }
                    Ok(None) => Ok(None),
                    Err(err) => {
                        self.last_error = Some(format!("{err:#}"));
                        Err(PipelineError::SourceRead(format!("{err:#}")))
                    }
                };
            }
        };
        match next_path {
            Some(path) => self.read_image(&path).map(Some).inspect_err(|err| {
                self.last_error = Some(err.to_string());
            }),
            None => Ok(None),
        }
    }

    fn is_healthy(&self) -> bool {
        self.backend.is_some() && self.last_error.is_none()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.describe(),
        }
    }

    fn release(&mut self) {
        if self.backend.take().is_some() {
            log::info!("FileSource: released {}", self.path.display());
        }
    }
}

fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_png(path: &Path, shade: u8) {
        RgbImage::from_pixel(8, 6, Rgb([shade, shade, shade]))
            .save(path)
            .expect("write png");
    }

    #[test]
    fn missing_file_fails_to_open() {
        let mut source = FileSource::new(PathBuf::from("/nonexistent/clip.mp4"), 10);
        let err = source.connect().unwrap_err();
        assert_eq!(err.kind(), "source_open");
        assert!(!source.is_healthy());
    }

    #[test]
    fn still_image_yields_one_frame() -> PipelineResult<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("still.png");
        write_png(&path, 50);

        let mut source = FileSource::new(path, 10);
        source.connect()?;
        let frame = source.next_frame()?.expect("one frame");
        assert_eq!((frame.width(), frame.height()), (8, 6));
        assert!(source.next_frame()?.is_none());
        source.release();
        assert!(source.next_frame().is_err());
        Ok(())
    }

    #[test]
    fn directory_yields_sorted_frames() -> PipelineResult<()> {
        let dir = tempfile::tempdir()?;
        write_png(&dir.path().join("b.png"), 200);
        write_png(&dir.path().join("a.png"), 10);
        std::fs::write(dir.path().join("notes.txt"), "ignored")?;

        let mut source = FileSource::new(dir.path().to_path_buf(), 10);
        source.connect()?;
        let first = source.next_frame()?.expect("first frame");
        assert_eq!(first.pixels()[0], 10);
        let second = source.next_frame()?.expect("second frame");
        assert_eq!(second.pixels()[0], 200);
        assert!(source.next_frame()?.is_none());
        assert_eq!(source.stats().frames_captured, 2);
        Ok(())
    }

    #[test]
    fn empty_directory_fails_to_open() -> PipelineResult<()> {
        let dir = tempfile::tempdir()?;
        let mut source = FileSource::new(dir.path().to_path_buf(), 10);
        assert!(source.connect().is_err());
        Ok(())
    }
}
