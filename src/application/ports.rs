use std::path::Path;

use async_trait::async_trait;

use crate::application::alert_service::Alert;
use crate::domain::{
    errors::DomainResult,
    frame::{Frame, Inference},
    stream::StreamSource,
};

/// Modelo de detección ya cargado. Debe admitir llamadas concurrentes.
pub trait DetectorPort: Send + Sync {
    fn infer(&self, frame: &Frame) -> DomainResult<Inference>;
}

/// Fuente de frames secuencial (cámara, URL o archivo de vídeo).
/// Liberar el recurso subyacente es responsabilidad de `Drop`.
pub trait FrameSourcePort: Send {
    /// `Ok(None)` indica fin de la fuente. Nunca debe bloquear sin plazo: una
    /// fuente que deja de entregar frames devuelve error, porque quien la
    /// consume sólo puede liberarla entre lecturas.
    fn read_frame(&mut self) -> DomainResult<Option<Frame>>;
    fn fps(&self) -> Option<f64>;
}

/// Destino de frames anotados (vídeo de salida).
pub trait FrameSinkPort: Send {
    fn write_frame(&mut self, frame: &Frame) -> DomainResult<()>;
    fn finish(self: Box<Self>) -> DomainResult<()>;
}

/// Apertura de fuentes y escritores de vídeo.
pub trait MediaPort: Send + Sync {
    fn open_stream(&self, source: &StreamSource) -> DomainResult<Box<dyn FrameSourcePort>>;
    fn open_video(&self, path: &Path) -> DomainResult<Box<dyn FrameSourcePort>>;
    fn create_video_writer(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        fps: f64,
    ) -> DomainResult<Box<dyn FrameSinkPort>>;
}

#[async_trait]
pub trait NotifierPort: Send + Sync {
    /// `false` cuando faltan credenciales o destinatario.
    fn is_configured(&self) -> bool;
    async fn notify(&self, alert: &Alert) -> DomainResult<()>;
}
