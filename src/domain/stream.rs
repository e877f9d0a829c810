use std::collections::BTreeMap;
use std::fmt;

use super::detection::Detection;

/// Frontera del multipart `multipart/x-mixed-replace`.
pub const MJPEG_BOUNDARY: &str = "frame";

/// Origen de un stream en vivo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamSource {
    /// Cámara local por índice (`/dev/videoN`).
    Camera(u32),
    /// Cámara de red (RTSP/HTTP).
    Url(String),
}

impl fmt::Display for StreamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamSource::Camera(idx) => write!(f, "camera:{idx}"),
            StreamSource::Url(url) => write!(f, "{url}"),
        }
    }
}

pub fn mjpeg_content_type() -> String {
    format!("multipart/x-mixed-replace; boundary={MJPEG_BOUNDARY}")
}

/// Envuelve un JPEG como una parte del multipart.
pub fn multipart_chunk(jpeg: &[u8]) -> Vec<u8> {
    let header = format!(
        "--{}\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        MJPEG_BOUNDARY,
        jpeg.len()
    );
    let mut data = Vec::with_capacity(header.len() + jpeg.len() + 2);
    data.extend_from_slice(header.as_bytes());
    data.extend_from_slice(jpeg);
    data.extend_from_slice(b"\r\n");
    data
}

/// Resumen legible, p. ej. "1 knife, 2 person". Orden alfabético por etiqueta.
pub fn summarize_detections(detections: &[Detection]) -> String {
    let mut counts = BTreeMap::new();
    for det in detections {
        *counts.entry(det.label.as_str()).or_insert(0) += 1;
    }
    counts.iter()
        .map(|(label, count)| format!("{} {}", count, label))
        .collect::<Vec<_>>()
        .join(", ")
}
