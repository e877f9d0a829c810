use anyhow::{anyhow, Result};
use image::{imageops::FilterType, RgbImage};
use ndarray::{s, Array4, ArrayView2, ArrayViewD, Axis, Ix2, IxDyn};
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::Session;
use ort::value::Tensor;
use std::fs;
use std::path::Path;

use crate::domain::detection::Detection;
use crate::domain::model::YoloParams;

/// Etiqueta para ids de clase fuera de la tabla.
pub const UNKNOWN_LABEL: &str = "object";

pub struct OnnxYoloEngine {
    session: Session,
    class_names: Vec<String>,
}

impl OnnxYoloEngine {
    pub fn load(path: &Path, class_names: Vec<String>) -> Result<Self> {
        let mut builder = Session::builder()?.with_intra_threads(4)?;

        // CUDA es opcional: si está disponible se registra, si no continuamos en CPU.
        let cuda = CUDAExecutionProvider::default().build();
        if let Ok(builder_with_cuda) = builder.clone().with_execution_providers([cuda]) {
            builder = builder_with_cuda;
        }

        let model_bytes = fs::read(path)?;
        let session = builder.commit_from_memory(&model_bytes)?;

        Ok(Self { session, class_names })
    }

    pub fn infer(&mut self, rgb: &RgbImage, params: &YoloParams) -> Result<Vec<Detection>> {
        let imgsz = params.input_size as usize;
        let input = preprocess(rgb, imgsz);
        let input_tensor = Tensor::from_array(input)?;

        let outputs = self.session.run(ort::inputs![input_tensor])?;
        let (shape_out, data_out) = outputs[0].try_extract_tensor::<f32>()?;

        let dims: Vec<usize> = shape_out.iter().map(|&x| x as usize).collect();
        let array_view = ArrayViewD::from_shape(IxDyn(&dims), data_out)?;
        let view = array_view
            .index_axis(Axis(0), 0)
            .into_dimensionality::<Ix2>()
            .map_err(|_| anyhow!("salida inesperada del modelo: {:?}", dims))?;

        let sx = rgb.width() as f32 / imgsz as f32;
        let sy = rgb.height() as f32 / imgsz as f32;

        let candidates = decode_candidates(
            view,
            params.conf_threshold,
            (sx, sy),
            (rgb.width() as f32, rgb.height() as f32),
            &self.class_names,
        )?;
        Ok(non_max_suppression(candidates, params.iou_threshold, params.max_detections))
    }
}

/// Redimensiona a `imgsz`x`imgsz` y pasa a tensor NCHW normalizado a [0, 1].
pub fn preprocess(rgb: &RgbImage, imgsz: usize) -> Array4<f32> {
    let resized = image::imageops::resize(rgb, imgsz as u32, imgsz as u32, FilterType::Nearest);

    let mut input = Array4::<f32>::zeros((1, 3, imgsz, imgsz));
    for (x, y, pixel) in resized.enumerate_pixels() {
        input[[0, 0, y as usize, x as usize]] = pixel[0] as f32 / 255.0;
        input[[0, 1, y as usize, x as usize]] = pixel[1] as f32 / 255.0;
        input[[0, 2, y as usize, x as usize]] = pixel[2] as f32 / 255.0;
    }
    input
}

/// Decodifica la salida YOLOv8 `[4 + clases, candidatos]` (cx, cy, w, h, puntuaciones...).
/// Sólo conserva candidatos con puntuación >= `conf_threshold`; las cajas se
/// escalan al frame original y se recortan a sus bordes.
pub fn decode_candidates(
    view: ArrayView2<f32>,
    conf_threshold: f32,
    (sx, sy): (f32, f32),
    (max_w, max_h): (f32, f32),
    class_names: &[String],
) -> Result<Vec<Detection>> {
    if view.shape()[0] < 5 {
        return Err(anyhow!("la salida del modelo no tiene puntuaciones de clase: {:?}", view.shape()));
    }

    let num_candidates = view.shape()[1];
    let mut detections = Vec::new();

    for i in 0..num_candidates {
        let scores = view.slice(s![4.., i]);
        let Some((class_id, &max_score)) = scores
            .indexed_iter()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
        else {
            continue;
        };

        if max_score >= conf_threshold {
            let cx = view[[0, i]];
            let cy = view[[1, i]];
            let w = view[[2, i]];
            let h = view[[3, i]];

            detections.push(Detection {
                label: label_for(class_names, class_id),
                confidence: max_score,
                class_id,
                x1: ((cx - w / 2.0) * sx).clamp(0.0, max_w),
                y1: ((cy - h / 2.0) * sy).clamp(0.0, max_h),
                x2: ((cx + w / 2.0) * sx).clamp(0.0, max_w),
                y2: ((cy + h / 2.0) * sy).clamp(0.0, max_h),
            });
        }
    }
    Ok(detections)
}

/// NMS por clase: de mayor a menor confianza, descarta cajas de la misma clase
/// con IoU >= `iou_threshold` respecto a una ya aceptada.
pub fn non_max_suppression(
    mut detections: Vec<Detection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Detection> {
    detections.sort_unstable_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Detection> = Vec::new();
    'outer: for d in detections {
        if kept.len() >= max_detections {
            break;
        }
        for k in &kept {
            if k.class_id == d.class_id && k.iou(&d) >= iou_threshold {
                continue 'outer;
            }
        }
        kept.push(d);
    }
    kept
}

pub fn label_for(class_names: &[String], class_id: usize) -> String {
    class_names
        .get(class_id)
        .cloned()
        .unwrap_or_else(|| UNKNOWN_LABEL.to_string())
}
