use std::sync::Mutex;

use image::RgbImage;
use tracing::debug;

use crate::adapters::onnx::{annotate::Annotator, yolo_engine::OnnxYoloEngine};
use crate::application::ports::DetectorPort;
use crate::domain::{
    errors::{DomainError, DomainResult},
    frame::{ensure_non_empty, Inference},
    model::YoloParams,
    stream::summarize_detections,
};

/// Detector YOLO/ONNX. La sesión de ort no es reentrante, así que las
/// inferencias concurrentes se serializan aquí; el dibujado va fuera del lock.
pub struct OnnxDetector {
    engine: Mutex<OnnxYoloEngine>,
    params: YoloParams,
    annotator: Annotator,
}

impl OnnxDetector {
    pub fn new(engine: OnnxYoloEngine, params: YoloParams, annotator: Annotator) -> Self {
        Self {
            engine: Mutex::new(engine),
            params,
            annotator,
        }
    }
}

impl DetectorPort for OnnxDetector {
    fn infer(&self, frame: &RgbImage) -> DomainResult<Inference> {
        ensure_non_empty(frame)?;

        let t_infer_start = std::time::Instant::now();
        let detections = {
            let mut engine = self
                .engine
                .lock()
                .map_err(|_| DomainError::OperationFailed("lock del motor envenenado".into()))?;
            engine
                .infer(frame, &self.params)
                .map_err(|e| DomainError::Inference(e.to_string()))?
        };
        debug!(
            "Inferencia {:.1} ms: [{}]",
            t_infer_start.elapsed().as_secs_f32() * 1000.0,
            summarize_detections(&detections)
        );

        let annotated = self.annotator.draw(frame, &detections);
        Ok(Inference { annotated, detections })
    }
}
