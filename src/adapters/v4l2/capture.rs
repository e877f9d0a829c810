use std::time::Duration;

use anyhow::{anyhow, Result};
use image::{ImageFormat, RgbImage};
use ouroboros::self_referencing;
use v4l::buffer::Type;
use v4l::format::FourCC;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::Device;

use crate::application::ports::FrameSourcePort;
use crate::domain::errors::{DomainError, DomainResult};

/// Espera máxima por un buffer; una cámara colgada devuelve error en vez de bloquear.
const CAPTURE_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuración para inicializar la captura de vídeo.
pub struct CaptureConfig {
    pub camera_path: String,
    pub fourcc: String,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl CaptureConfig {
    /// MJPG 640x480 a 30 FPS sobre `/dev/videoN`; el driver ajusta lo que no soporte.
    pub fn for_index(index: u32) -> Self {
        Self {
            camera_path: format!("/dev/video{index}"),
            fourcc: "MJPG".to_string(),
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

// El stream MMAP toma prestado el dispositivo; ambos viajan juntos y se
// liberan a la vez al soltar la captura.
#[self_referencing]
struct DeviceStream {
    device: Device,
    #[borrows(device)]
    #[covariant]
    stream: Stream<'this>,
}

/// Adaptador para la captura física de frames usando V4L2.
pub struct V4l2Capture {
    inner: DeviceStream,
    fourcc: FourCC,
    width: u32,
    height: u32,
    fps: Option<f64>,
}

impl V4l2Capture {
    /// Abre el dispositivo de cámara y configura el formato y el flujo de memoria mapeada (MMAP).
    pub fn open(cfg: &CaptureConfig) -> Result<Self> {
        let dev = Device::with_path(&cfg.camera_path)?;

        // 1. Configurar Formato
        let mut fmt = dev.format()?;
        let b = cfg.fourcc.as_bytes();
        if b.len() != 4 {
            return Err(anyhow!("FourCC debe tener 4 caracteres"));
        }
        fmt.fourcc = FourCC::new(&[b[0], b[1], b[2], b[3]]);
        fmt.width = cfg.width;
        fmt.height = cfg.height;

        // Aplicar formato (el driver puede ajustar los valores a los más cercanos soportados)
        let actual_fmt = dev.set_format(&fmt)?;

        // 2. Configurar FPS (Frame Interval)
        let mut params = dev.params()?;
        params.interval.numerator = 1;
        params.interval.denominator = cfg.fps;
        let fps = match dev.set_params(&params) {
            Ok(applied) => interval_fps(applied.interval.numerator, applied.interval.denominator),
            Err(e) => {
                tracing::warn!("⚠️ El driver rechazó {} FPS: {}", cfg.fps, e);
                dev.params()
                    .ok()
                    .and_then(|p| interval_fps(p.interval.numerator, p.interval.denominator))
            }
        };

        // 3. Inicializar Stream (MMAP)
        let inner = DeviceStreamTryBuilder {
            device: dev,
            stream_builder: |device: &Device| {
                let mut stream = Stream::with_buffers(device, Type::VideoCapture, 4)?;
                stream.set_timeout(CAPTURE_TIMEOUT);
                Ok::<_, std::io::Error>(stream)
            },
        }
        .try_build()?;

        tracing::info!(
            "Cámara abierta: {}x{} [{}] a {:?} FPS",
            actual_fmt.width, actual_fmt.height, actual_fmt.fourcc, fps
        );

        Ok(Self {
            inner,
            fourcc: actual_fmt.fourcc,
            width: actual_fmt.width,
            height: actual_fmt.height,
            fps,
        })
    }

    /// Captura el siguiente frame y lo devuelve en RGB.
    pub fn next_rgb(&mut self) -> Result<RgbImage> {
        let fcc_str = self
            .fourcc
            .str()
            .map_err(|_| anyhow!("FourCC inválido"))?
            .to_string();
        let (w, h) = (self.width, self.height);

        self.inner.with_stream_mut(|stream| {
            let (data, _) = stream.next()?;
            decode_frame(data, &fcc_str, w, h)
        })
    }
}

impl FrameSourcePort for V4l2Capture {
    fn read_frame(&mut self) -> DomainResult<Option<RgbImage>> {
        self.next_rgb()
            .map(Some)
            .map_err(|e| DomainError::OperationFailed(format!("captura V4L2: {e:#}")))
    }

    fn fps(&self) -> Option<f64> {
        self.fps
    }
}

/// Intervalo V4L2 (segundos por frame) a FPS.
fn interval_fps(numerator: u32, denominator: u32) -> Option<f64> {
    (numerator > 0 && denominator > 0).then(|| denominator as f64 / numerator as f64)
}

fn decode_frame(data: &[u8], fourcc: &str, w: u32, h: u32) -> Result<RgbImage> {
    match fourcc {
        // MJPG es básicamente una secuencia de JPEGs
        "MJPG" => Ok(image::load_from_memory_with_format(data, ImageFormat::Jpeg)?.to_rgb8()),
        "YUYV" => Ok(yuyv_to_rgb(data, w, h)),
        _ => Err(anyhow!("Formato de cámara {} no soportado por este pipeline", fourcc)),
    }
}

/// Convierte un buffer YUYV (YUV 4:2:2) a una RgbImage.
fn yuyv_to_rgb(yuyv: &[u8], w: u32, h: u32) -> RgbImage {
    let mut out = RgbImage::new(w, h);

    // Cada bloque de 4 bytes en YUYV define 2 píxeles: [Y0, U, Y1, V]
    for (i, chunk) in yuyv.chunks_exact(4).enumerate() {
        let y0 = chunk[0] as f32;
        let u = chunk[1] as f32 - 128.0;
        let y1 = chunk[2] as f32;
        let v = chunk[3] as f32 - 128.0;

        // BT.601
        let to_rgb = |y: f32| {
            image::Rgb([
                (y + 1.402 * v).clamp(0.0, 255.0) as u8,
                (y - 0.344136 * u - 0.714136 * v).clamp(0.0, 255.0) as u8,
                (y + 1.772 * u).clamp(0.0, 255.0) as u8,
            ])
        };

        let pixel_idx = i as u32 * 2;
        let x = pixel_idx % w;
        let y = pixel_idx / w;

        if y < h {
            out.put_pixel(x, y, to_rgb(y0));
            if x + 1 < w {
                out.put_pixel(x + 1, y, to_rgb(y1));
            }
        }
    }
    out
}
