use anyhow::{anyhow, Context, Result};
use std::path::Path;
use tracing::{info, warn};

use crate::adapters::onnx::yolo_engine::OnnxYoloEngine;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::model::ModelId;

pub const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket",
    "bottle", "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana",
    "apple", "sandwich", "orange", "broccoli", "carrot", "hot dog", "pizza",
    "donut", "cake", "chair", "couch", "potted plant", "bed", "dining table", "toilet", "tv",
    "laptop", "mouse", "remote", "keyboard", "cell phone", "microwave", "oven", "toaster",
    "sink", "refrigerator", "book", "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

pub struct OnnxModelCatalog;

impl OnnxModelCatalog {
    pub fn new() -> Self { Self }

    /// El archivo debe existir y no estar vacío.
    pub fn validate_model(&self, model: &ModelId) -> DomainResult<()> {
        if model.onnx_path.as_os_str().is_empty() {
            return Err(DomainError::InvalidInput("onnx_path empty".into()));
        }
        let meta = std::fs::metadata(&model.onnx_path).map_err(|_| {
            DomainError::NotFound(format!("model file not found: {}", model.onnx_path.display()))
        })?;
        if !meta.is_file() || meta.len() == 0 {
            return Err(DomainError::InvalidInput(format!(
                "model file is empty: {}",
                model.onnx_path.display()
            )));
        }
        Ok(())
    }

    /// Modelos a intentar, en orden: el propio si es válido, después el de respaldo.
    pub fn candidates<'a>(&self, primary: &'a ModelId, fallback: &'a ModelId) -> Vec<&'a ModelId> {
        let mut out = Vec::with_capacity(2);
        match self.validate_model(primary) {
            Ok(()) => out.push(primary),
            Err(e) => warn!("[MODEL] Modelo propio no disponible ({}); se usará el de respaldo", e),
        }
        if fallback != primary {
            out.push(fallback);
        }
        out
    }

    /// Carga el primer modelo que funcione. Si ninguno carga, el arranque debe abortar.
    pub fn load_with_fallback(
        &self,
        primary: &ModelId,
        fallback: &ModelId,
        class_names: &[String],
    ) -> Result<(ModelId, OnnxYoloEngine)> {
        let mut last_err = None;
        for model in self.candidates(primary, fallback) {
            info!("[MODEL] Cargando {} desde {}", model.name, model.onnx_path.display());
            match OnnxYoloEngine::load(&model.onnx_path, class_names.to_vec()) {
                Ok(engine) => return Ok((model.clone(), engine)),
                Err(e) => {
                    warn!("[MODEL] Falló la carga de {}: {:?}", model.name, e);
                    last_err = Some(e);
                }
            }
        }
        Err(last_err
            .unwrap_or_else(|| anyhow!("no hay modelo disponible"))
            .context(format!("no se pudo cargar el modelo de respaldo {}", fallback.onnx_path.display())))
    }

    /// Nombres de clase: uno por línea desde archivo, o COCO si no se indica.
    pub fn load_class_names(&self, path: Option<&Path>) -> Result<Vec<String>> {
        let Some(path) = path else {
            return Ok(COCO_CLASSES.iter().map(|s| s.to_string()).collect());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("no se pudo leer {}", path.display()))?;
        let names = parse_class_names(&raw);
        if names.is_empty() {
            return Err(anyhow!("{} no contiene nombres de clase", path.display()));
        }
        Ok(names)
    }
}

impl Default for OnnxModelCatalog {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_class_names(raw: &str) -> Vec<String> {
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}
