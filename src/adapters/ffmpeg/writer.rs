use std::io::Write;
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};

use image::RgbImage;
use tracing::{debug, warn};

use crate::application::ports::FrameSinkPort;
use crate::domain::errors::{DomainError, DomainResult};

pub fn encode_args(output: &Path, width: u32, height: u32, fps: f64, codec: &str) -> Vec<String> {
    let mut args: Vec<String> = [
        "-hide_banner",
        "-loglevel",
        "error",
        "-y",
        "-f",
        "rawvideo",
        "-pix_fmt",
        "rgb24",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.extend([
        "-s".to_string(),
        format!("{width}x{height}"),
        "-r".into(),
        format!("{fps:.3}"),
        "-i".into(),
        "pipe:0".into(),
        "-an".into(),
        // yuv420p exige dimensiones pares.
        "-vf".into(),
        "pad=ceil(iw/2)*2:ceil(ih/2)*2".into(),
        "-c:v".into(),
        codec.to_string(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-movflags".into(),
        "+faststart".into(),
        output.to_string_lossy().to_string(),
    ]);
    args
}

/// Escritor de vídeo: empuja RGB24 crudo al stdin de un `ffmpeg` hijo.
pub struct FfmpegVideoWriter {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    width: u32,
    height: u32,
    frames: u64,
}

impl FfmpegVideoWriter {
    pub fn spawn(
        ffmpeg: &str,
        output: &Path,
        width: u32,
        height: u32,
        fps: f64,
        codec: &str,
    ) -> DomainResult<Self> {
        let mut child = Command::new(ffmpeg)
            .args(encode_args(output, width, height, fps, codec))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| DomainError::OperationFailed(format!("no se pudo ejecutar {ffmpeg}: {e}")))?;
        let stdin = child.stdin.take();
        Ok(Self {
            child: Some(child),
            stdin,
            width,
            height,
            frames: 0,
        })
    }
}

impl FrameSinkPort for FfmpegVideoWriter {
    fn write_frame(&mut self, frame: &RgbImage) -> DomainResult<()> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(DomainError::InvalidInput(format!(
                "frame {}x{} en un vídeo de {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| DomainError::OperationFailed("escritor ya cerrado".into()))?;
        stdin
            .write_all(frame.as_raw())
            .map_err(|e| DomainError::OperationFailed(format!("ffmpeg rechazó el frame: {e}")))?;
        self.frames += 1;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> DomainResult<()> {
        // Cerrar stdin es la señal de fin de vídeo para ffmpeg.
        drop(self.stdin.take());
        let Some(child) = self.child.take() else {
            return Ok(());
        };
        let output = child
            .wait_with_output()
            .map_err(|e| DomainError::OperationFailed(format!("esperando a ffmpeg: {e}")))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DomainError::OperationFailed(format!(
                "ffmpeg terminó con {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        debug!("ffmpeg: vídeo cerrado con {} frames", self.frames);
        Ok(())
    }
}

impl Drop for FfmpegVideoWriter {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            warn!("ffmpeg: escritor soltado sin finalizar; abortando");
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
