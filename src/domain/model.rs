use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelId {
    pub name: String,       // nombre lógico, p. ej. "custom" o "yolov8n"
    pub onnx_path: PathBuf, // ruta en disco
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YoloParams {
    pub input_size: u32,        // 640 típico
    pub conf_threshold: f32,    // suelo de candidatos, 0..1
    pub iou_threshold: f32,     // NMS, 0..1
    pub max_detections: usize,  // p. ej. 100
}

impl Default for YoloParams {
    fn default() -> Self {
        Self {
            input_size: 640,
            conf_threshold: 0.25,
            iou_threshold: 0.45,
            max_detections: 100,
        }
    }
}
