//! Decodificación y codificación de vídeo delegando en los binarios `ffmpeg`/`ffprobe`.
//! Los frames viajan como RGB24 crudo por las tuberías estándar del proceso hijo.

pub mod media;
pub mod probe;
pub mod source;
pub mod writer;

use std::path::Path;
use std::time::Duration;

/// Tiempo máximo sin datos de una cámara de red antes de que ffmpeg aborte.
pub const NETWORK_IO_TIMEOUT: Duration = Duration::from_secs(10);

/// Entrada de ffmpeg: opciones previas a `-i` y el destino.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FfmpegInput {
    pub input_args: Vec<String>,
    pub target: String,
}

impl FfmpegInput {
    pub fn file(path: &Path) -> Self {
        Self {
            input_args: Vec::new(),
            target: path.to_string_lossy().to_string(),
        }
    }

    /// Cámara de red. RTSP se fuerza sobre TCP para no perder paquetes; toda
    /// entrada de red lleva timeout de E/S (en microsegundos) para que una
    /// cámara que deja de emitir termine el proceso.
    pub fn url(url: &str) -> Self {
        let micros = NETWORK_IO_TIMEOUT.as_micros().to_string();
        let input_args = if url.starts_with("rtsp://") || url.starts_with("rtsps://") {
            vec![
                "-rtsp_transport".to_string(),
                "tcp".to_string(),
                "-timeout".to_string(),
                micros,
            ]
        } else {
            vec!["-rw_timeout".to_string(), micros]
        };
        Self {
            input_args,
            target: url.to_string(),
        }
    }

    /// Cámara local V4L2 por índice.
    pub fn camera(index: u32) -> Self {
        Self {
            input_args: vec!["-f".to_string(), "v4l2".to_string()],
            target: format!("/dev/video{index}"),
        }
    }
}
