use tracing::{error, info, warn};

use crate::application::{
    ports::{FrameSourcePort, MediaPort},
    services::DetectionService,
};
use crate::domain::{
    errors::DomainResult,
    frame::encode_jpeg,
    stream::{multipart_chunk, StreamSource},
};

/// Stream en vivo: secuencia perezosa, no reiniciable, de partes MJPEG.
///
/// Abrir la fuente ocurre en [`LiveStream::open`]; si falla no se emite nada
/// ni se toca el estado. Cada `next()` lee un frame, detecta, publica el
/// veredicto y devuelve el frame anotado ya empaquetado. Al terminar (fin de
/// fuente, error de lectura o de inferencia) la fuente se libera y el iterador
/// devuelve `None` para siempre. Soltar el iterador también la libera.
pub struct LiveStream {
    source: Option<Box<dyn FrameSourcePort>>,
    label: String,
    detection: DetectionService,
    jpeg_quality: u8,
    frames: u64,
}

impl LiveStream {
    pub fn open(
        media: &dyn MediaPort,
        source: &StreamSource,
        detection: DetectionService,
        jpeg_quality: u8,
    ) -> DomainResult<Self> {
        let opened = media.open_stream(source).map_err(|e| {
            warn!("[STREAM] No se pudo abrir {}: {}", source, e);
            e
        })?;
        info!("[STREAM] Fuente abierta: {}", source);
        Ok(Self {
            source: Some(opened),
            label: source.to_string(),
            detection,
            jpeg_quality,
            frames: 0,
        })
    }

    pub fn is_ended(&self) -> bool {
        self.source.is_none()
    }

    fn close(&mut self) {
        if self.source.take().is_some() {
            info!("[STREAM] {} cerrado tras {} frames", self.label, self.frames);
        }
    }
}

impl Iterator for LiveStream {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        loop {
            let source = self.source.as_mut()?;

            let frame = match source.read_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!("[STREAM] Fin de la fuente {}", self.label);
                    self.close();
                    return None;
                }
                Err(e) => {
                    warn!("[STREAM] Falló la lectura de frame ({}); fin del stream", e);
                    self.close();
                    return None;
                }
            };

            let analysis = match self.detection.analyze(&frame) {
                Ok(a) => a,
                Err(e) => {
                    error!("[STREAM] Inferencia fallida en {}: {}", self.label, e);
                    self.close();
                    return None;
                }
            };

            self.detection
                .publish(analysis.weapon_found, &self.label, &analysis.detections);

            match encode_jpeg(&analysis.annotated, self.jpeg_quality) {
                Ok(jpeg) => {
                    self.frames += 1;
                    return Some(multipart_chunk(&jpeg));
                }
                Err(e) => {
                    warn!("[STREAM] Frame descartado: {}", e);
                    continue;
                }
            }
        }
    }
}

impl Drop for LiveStream {
    fn drop(&mut self) {
        self.close();
    }
}
