use std::path::Path;

use tracing::warn;

use crate::adapters::ffmpeg::{
    probe::probe, source::FfmpegFrameSource, writer::FfmpegVideoWriter, FfmpegInput,
};
use crate::application::ports::{FrameSinkPort, FrameSourcePort, MediaPort};
use crate::domain::{
    errors::{DomainError, DomainResult},
    stream::StreamSource,
};

/// Implementación de [`MediaPort`] sobre ffmpeg. Con la feature `v4l2` las
/// cámaras locales se abren directamente por V4L2.
#[derive(Debug, Clone)]
pub struct FfmpegMedia {
    ffmpeg: String,
    ffprobe: String,
    video_codec: String,
}

impl FfmpegMedia {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>, video_codec: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
            video_codec: video_codec.into(),
        }
    }

    fn spawn_source(&self, input: &FfmpegInput) -> DomainResult<FfmpegFrameSource> {
        let info = probe(&self.ffprobe, input)?;
        FfmpegFrameSource::spawn(&self.ffmpeg, input, info)
    }

    #[cfg(feature = "v4l2")]
    fn open_camera(&self, index: u32) -> DomainResult<Box<dyn FrameSourcePort>> {
        use crate::adapters::v4l2::capture::{CaptureConfig, V4l2Capture};

        let capture = V4l2Capture::open(&CaptureConfig::for_index(index))
            .map_err(|e| DomainError::SourceUnavailable(format!("cámara {index}: {e:#}")))?;
        Ok(Box::new(capture))
    }

    #[cfg(not(feature = "v4l2"))]
    fn open_camera(&self, index: u32) -> DomainResult<Box<dyn FrameSourcePort>> {
        let source = self
            .spawn_source(&FfmpegInput::camera(index))
            .map_err(|e| DomainError::SourceUnavailable(format!("cámara {index}: {e}")))?;
        Ok(Box::new(source))
    }
}

impl MediaPort for FfmpegMedia {
    fn open_stream(&self, source: &StreamSource) -> DomainResult<Box<dyn FrameSourcePort>> {
        match source {
            StreamSource::Camera(index) => self.open_camera(*index),
            StreamSource::Url(url) => {
                let url = url.trim();
                if url.is_empty() {
                    return Err(DomainError::InvalidInput("URL de stream vacía".into()));
                }
                let source = self.spawn_source(&FfmpegInput::url(url)).map_err(|e| {
                    warn!("No se pudo abrir {}: {}", url, e);
                    DomainError::SourceUnavailable(format!("no se puede abrir el stream {url}"))
                })?;
                Ok(Box::new(source))
            }
        }
    }

    fn open_video(&self, path: &Path) -> DomainResult<Box<dyn FrameSourcePort>> {
        if !path.is_file() {
            return Err(DomainError::SourceUnavailable(format!(
                "no existe el vídeo {}",
                path.display()
            )));
        }
        let source = self
            .spawn_source(&FfmpegInput::file(path))
            .map_err(|e| DomainError::Decode(format!("no se puede abrir el vídeo: {e}")))?;
        Ok(Box::new(source))
    }

    fn create_video_writer(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        fps: f64,
    ) -> DomainResult<Box<dyn FrameSinkPort>> {
        let writer = FfmpegVideoWriter::spawn(&self.ffmpeg, path, width, height, fps, &self.video_codec)?;
        Ok(Box::new(writer))
    }
}
