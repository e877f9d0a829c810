use image::RgbImage;

use super::detection::Detection;
use super::errors::{DomainError, DomainResult};

/// Frame decodificado: RGB de 8 bits por canal.
pub type Frame = RgbImage;

/// Resultado de pasar un frame por el detector.
#[derive(Debug, Clone)]
pub struct Inference {
    pub annotated: Frame,
    pub detections: Vec<Detection>,
}

pub fn ensure_non_empty(frame: &Frame) -> DomainResult<()> {
    if frame.width() == 0 || frame.height() == 0 {
        return Err(DomainError::InvalidInput(format!(
            "frame vacío ({}x{})",
            frame.width(),
            frame.height()
        )));
    }
    Ok(())
}

/// Comprime un frame a JPEG con la calidad indicada (1..=100).
pub fn encode_jpeg(frame: &Frame, quality: u8) -> DomainResult<Vec<u8>> {
    ensure_non_empty(frame)?;
    let mut jpeg = Vec::new();
    let mut enc = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut jpeg, quality);
    enc.encode(
        frame.as_raw(),
        frame.width(),
        frame.height(),
        image::ExtendedColorType::Rgb8,
    )
    .map_err(|e| DomainError::OperationFailed(format!("codificación JPEG: {e}")))?;
    Ok(jpeg)
}
