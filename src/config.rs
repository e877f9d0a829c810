//! Configuración del servidor a partir de variables de entorno.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::domain::keywords::{WeaponKeywords, DEFAULT_CONFIDENCE};
use crate::domain::model::YoloParams;

/// Qué devuelve `POST /upload` para una imagen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageResponse {
    /// Informe JSON con las detecciones y la URL del archivo anotado.
    Json,
    /// El JPEG anotado tal cual.
    Image,
}

impl FromStr for ImageResponse {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "image" => Ok(Self::Image),
            other => bail!("UPLOAD_IMAGE_RESPONSE desconocido: {other} (json|image)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub sender: Option<String>,
    pub password: Option<String>,
    pub receiver: Option<String>,
}

impl MailConfig {
    pub fn is_complete(&self) -> bool {
        self.sender.is_some() && self.password.is_some() && self.receiver.is_some()
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,

    pub model_path: PathBuf,
    pub fallback_model_path: PathBuf,
    pub class_names_path: Option<PathBuf>,
    pub label_font_path: Option<PathBuf>,
    pub yolo: YoloParams,

    pub confidence_threshold: f32,
    pub keywords: WeaponKeywords,
    pub alert_cooldown: Duration,
    pub video_sample_frames: usize,

    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    pub image_response: ImageResponse,

    pub camera_index: u32,
    pub jpeg_quality: u8,

    pub ffmpeg_bin: String,
    pub ffprobe_bin: String,
    pub video_codec: String,

    pub mail: MailConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Igual que [`AppConfig::from_env`] pero con una fuente de variables inyectable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let text = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let defaults = YoloParams::default();
        let yolo = YoloParams {
            input_size: parse_or(get("YOLO_IMGSZ"), "YOLO_IMGSZ", defaults.input_size)?,
            conf_threshold: parse_or(get("YOLO_CONF"), "YOLO_CONF", defaults.conf_threshold)?,
            iou_threshold: parse_or(get("YOLO_IOU"), "YOLO_IOU", defaults.iou_threshold)?,
            max_detections: parse_or(get("YOLO_MAX_DET"), "YOLO_MAX_DET", defaults.max_detections)?,
        };

        let keywords = match get("WEAPON_KEYWORDS") {
            Some(raw) => WeaponKeywords::parse_csv(&raw),
            None => WeaponKeywords::default(),
        };

        let cfg = Self {
            host: text("HOST", "0.0.0.0"),
            port: parse_or(get("PORT"), "PORT", 5000)?,
            model_path: text("MODEL_PATH", "weights/best.onnx").into(),
            fallback_model_path: text("FALLBACK_MODEL_PATH", "yolov8n.onnx").into(),
            class_names_path: get("CLASS_NAMES_PATH").map(PathBuf::from),
            label_font_path: get("LABEL_FONT_PATH").map(PathBuf::from),
            yolo,
            confidence_threshold: parse_or(
                get("CONFIDENCE_THRESHOLD"),
                "CONFIDENCE_THRESHOLD",
                DEFAULT_CONFIDENCE,
            )?,
            keywords,
            alert_cooldown: Duration::from_secs(parse_or(
                get("ALERT_COOLDOWN_SECS"),
                "ALERT_COOLDOWN_SECS",
                30u64,
            )?),
            video_sample_frames: parse_or(get("VIDEO_SAMPLE_FRAMES"), "VIDEO_SAMPLE_FRAMES", 100)?,
            upload_dir: text("UPLOAD_DIR", "uploads").into(),
            max_upload_bytes: parse_or(get("MAX_UPLOAD_BYTES"), "MAX_UPLOAD_BYTES", 256 * 1024 * 1024)?,
            image_response: get("UPLOAD_IMAGE_RESPONSE")
                .map(|v| v.parse())
                .transpose()?
                .unwrap_or(ImageResponse::Json),
            camera_index: parse_or(get("CAMERA_INDEX"), "CAMERA_INDEX", 0)?,
            jpeg_quality: parse_or(get("JPEG_QUALITY"), "JPEG_QUALITY", 80)?,
            ffmpeg_bin: text("FFMPEG_BIN", "ffmpeg"),
            ffprobe_bin: text("FFPROBE_BIN", "ffprobe"),
            video_codec: text("FFMPEG_VIDEO_CODEC", "libx264"),
            mail: MailConfig {
                smtp_host: text("SMTP_HOST", "smtp.gmail.com"),
                smtp_port: parse_or(get("SMTP_PORT"), "SMTP_PORT", 465)?,
                sender: get("EMAIL_SENDER"),
                password: get("EMAIL_PASSWORD"),
                receiver: get("EMAIL_RECEIVER"),
            },
        };
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        unit_interval("CONFIDENCE_THRESHOLD", self.confidence_threshold)?;
        unit_interval("YOLO_CONF", self.yolo.conf_threshold)?;
        unit_interval("YOLO_IOU", self.yolo.iou_threshold)?;
        if self.yolo.input_size == 0 || self.yolo.input_size % 32 != 0 {
            bail!("YOLO_IMGSZ debe ser múltiplo de 32 y > 0 (recibido {})", self.yolo.input_size);
        }
        if self.yolo.max_detections == 0 {
            bail!("YOLO_MAX_DET debe ser > 0");
        }
        if self.video_sample_frames == 0 {
            bail!("VIDEO_SAMPLE_FRAMES debe ser > 0");
        }
        if !(1..=100).contains(&self.jpeg_quality) {
            bail!("JPEG_QUALITY debe estar en 1..=100 (recibido {})", self.jpeg_quality);
        }
        if self.max_upload_bytes == 0 {
            bail!("MAX_UPLOAD_BYTES debe ser > 0");
        }
        if self.keywords.is_empty() {
            bail!("WEAPON_KEYWORDS no puede quedar vacío");
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match raw {
        None => Ok(default),
        Some(v) => v
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("{key} inválido: {v:?}")),
    }
}

fn unit_interval(key: &str, value: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        bail!("{key} debe estar en [0, 1] (recibido {value})");
    }
    Ok(())
}
