use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use anyhow::{Context, Result};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use crate::domain::detection::Detection;

const PALETTE: [[u8; 3]; 8] = [
    [255, 56, 56],
    [255, 157, 151],
    [255, 112, 31],
    [255, 178, 29],
    [72, 249, 10],
    [26, 147, 52],
    [0, 194, 255],
    [132, 56, 255],
];

const BOX_THICKNESS: u32 = 2;
const LABEL_SCALE: f32 = 16.0;

/// Dibuja las cajas (y etiquetas, si hay fuente) sobre una copia del frame.
pub struct Annotator {
    font: Option<FontVec>,
}

impl Annotator {
    /// Sólo cajas: sin fuente no se puede rasterizar texto.
    pub fn boxes_only() -> Self {
        Self { font: None }
    }

    pub fn with_font_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("no se pudo leer la fuente {}", path.display()))?;
        let font = FontVec::try_from_vec(bytes)
            .map_err(|_| anyhow::anyhow!("fuente inválida: {}", path.display()))?;
        Ok(Self { font: Some(font) })
    }

    pub fn draw(&self, frame: &RgbImage, detections: &[Detection]) -> RgbImage {
        let mut out = frame.clone();
        let (w, h) = out.dimensions();
        if w == 0 || h == 0 {
            return out;
        }

        for det in detections {
            let color = color_for(det.class_id);
            let x1 = (det.x1.max(0.0) as u32).min(w - 1);
            let y1 = (det.y1.max(0.0) as u32).min(h - 1);
            let x2 = (det.x2.max(0.0) as u32).min(w - 1).max(x1);
            let y2 = (det.y2.max(0.0) as u32).min(h - 1).max(y1);

            for t in 0..BOX_THICKNESS {
                let (bw, bh) = (x2 - x1 + 1, y2 - y1 + 1);
                if 2 * t >= bw || 2 * t >= bh {
                    break;
                }
                let rect = Rect::at((x1 + t) as i32, (y1 + t) as i32).of_size(bw - 2 * t, bh - 2 * t);
                draw_hollow_rect_mut(&mut out, rect, color);
            }

            if let Some(font) = &self.font {
                let text = format!("{} {:.2}", det.label, det.confidence);
                let scale = PxScale::from(LABEL_SCALE);
                let (tw, th) = text_size(scale, font, &text);
                let ty = (y1 as i32 - th as i32 - 2).max(0);
                let bg = Rect::at(x1 as i32, ty).of_size(tw.max(1) + 4, th.max(1) + 2);
                draw_filled_rect_mut(&mut out, bg, color);
                draw_text_mut(&mut out, Rgb([255, 255, 255]), x1 as i32 + 2, ty, scale, font, &text);
            }
        }
        out
    }
}

fn color_for(class_id: usize) -> Rgb<u8> {
    Rgb(PALETTE[class_id % PALETTE.len()])
}
