use std::sync::Arc;

use crate::adapters::fs::output_dir::OutputDir;
use crate::application::{
    ports::MediaPort,
    services::{BatchService, DetectionService},
};
use crate::config::ImageResponse;

/// Ajustes de la capa HTTP que no pertenecen a ningún servicio.
#[derive(Debug, Clone, Copy)]
pub struct HttpSettings {
    pub camera_index: u32,
    pub jpeg_quality: u8,
    pub image_response: ImageResponse,
    pub max_upload_bytes: usize,
}

/// Estado compartido para los manejadores HTTP de Axum.
/// Todo es barato de clonar: servicios y adaptadores van detrás de `Arc`.
#[derive(Clone)]
pub struct HttpState {
    /// Detector + clasificador + estado global + alertas.
    pub detection: DetectionService,
    /// Casos de uso de subida (imagen / vídeo).
    pub batch: Arc<BatchService>,
    /// Apertura de cámaras y URLs para los streams en vivo.
    pub media: Arc<dyn MediaPort>,
    pub outputs: Arc<OutputDir>,
    pub settings: HttpSettings,
}
