use std::io::{self, ErrorKind, Read};
use std::process::{Child, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use image::RgbImage;
use tracing::{debug, info, warn};

use crate::adapters::ffmpeg::{probe::VideoInfo, FfmpegInput};
use crate::application::ports::FrameSourcePort;
use crate::domain::errors::{DomainError, DomainResult};

/// Espera máxima por un frame. Pasado ese tiempo la fuente se da por caída.
pub const FRAME_TIMEOUT: Duration = Duration::from_secs(10);

/// Frames ya leídos a la espera de consumo.
const READ_AHEAD: usize = 2;

/// La geometría de salida se fija explícitamente: así el tamaño de cada frame
/// en la tubería coincide siempre con `info`, rote o no ffmpeg la entrada.
pub fn decode_args(input: &FfmpegInput, info: &VideoInfo) -> Vec<String> {
    let mut args: Vec<String> = vec!["-hide_banner".into(), "-loglevel".into(), "error".into()];
    args.extend(input.input_args.iter().cloned());
    args.extend([
        "-i".to_string(),
        input.target.clone(),
        "-an".into(),
        "-vf".into(),
        format!("scale={}:{}", info.width, info.height),
        "-f".into(),
        "rawvideo".into(),
        "-pix_fmt".into(),
        "rgb24".into(),
        "pipe:1".into(),
    ]);
    args
}

/// Lector de frames de tamaño fijo en un hilo aparte, para poder esperar con
/// plazo aunque la tubería se quede sin datos.
pub struct FrameReader {
    frames: Receiver<io::Result<Vec<u8>>>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    Frame(Vec<u8>),
    End,
    Stalled,
}

impl FrameReader {
    pub fn spawn<R: Read + Send + 'static>(mut pipe: R, frame_len: usize) -> Self {
        let (tx, rx) = mpsc::sync_channel(READ_AHEAD);
        thread::spawn(move || loop {
            let mut buf = vec![0u8; frame_len];
            let res = pipe.read_exact(&mut buf).map(|_| buf);
            let failed = res.is_err();
            if tx.send(res).is_err() || failed {
                break;
            }
        });
        Self { frames: rx }
    }

    pub fn next(&self, timeout: Duration) -> io::Result<ReadOutcome> {
        match self.frames.recv_timeout(timeout) {
            Ok(Ok(buf)) => Ok(ReadOutcome::Frame(buf)),
            Ok(Err(e)) if e.kind() == ErrorKind::UnexpectedEof => Ok(ReadOutcome::End),
            Ok(Err(e)) => Err(e),
            Err(RecvTimeoutError::Timeout) => Ok(ReadOutcome::Stalled),
            Err(RecvTimeoutError::Disconnected) => Ok(ReadOutcome::End),
        }
    }
}

/// Fuente de frames leyendo RGB24 crudo del stdout de un `ffmpeg` hijo.
/// Soltarla mata el proceso, lo que cierra la cámara o el archivo.
pub struct FfmpegFrameSource {
    child: Child,
    reader: FrameReader,
    info: VideoInfo,
    target: String,
    frames_read: u64,
}

impl FfmpegFrameSource {
    pub fn spawn(ffmpeg: &str, input: &FfmpegInput, info: VideoInfo) -> DomainResult<Self> {
        let mut child = Command::new(ffmpeg)
            .args(decode_args(input, &info))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| DomainError::OperationFailed(format!("no se pudo ejecutar {ffmpeg}: {e}")))?;

        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(DomainError::OperationFailed("ffmpeg sin stdout".into()));
            }
        };

        info!(
            "ffmpeg: decodificando {} ({}x{} @ {:?} fps)",
            input.target, info.width, info.height, info.fps
        );

        let frame_len = info.width as usize * info.height as usize * 3;
        Ok(Self {
            child,
            reader: FrameReader::spawn(stdout, frame_len),
            info,
            target: input.target.clone(),
            frames_read: 0,
        })
    }
}

impl FrameSourcePort for FfmpegFrameSource {
    fn read_frame(&mut self) -> DomainResult<Option<RgbImage>> {
        let buf = match self.reader.next(FRAME_TIMEOUT) {
            Ok(ReadOutcome::Frame(buf)) => buf,
            Ok(ReadOutcome::End) => return Ok(None),
            Ok(ReadOutcome::Stalled) => {
                warn!("ffmpeg: {} sin frames en {:?}; se corta", self.target, FRAME_TIMEOUT);
                let _ = self.child.kill();
                return Err(DomainError::SourceUnavailable(format!(
                    "{} dejó de enviar frames",
                    self.target
                )));
            }
            Err(e) => {
                return Err(DomainError::OperationFailed(format!(
                    "lectura de {} interrumpida: {e}",
                    self.target
                )))
            }
        };
        self.frames_read += 1;
        RgbImage::from_raw(self.info.width, self.info.height, buf)
            .map(Some)
            .ok_or_else(|| DomainError::Decode("tamaño de frame inconsistente".into()))
    }

    fn fps(&self) -> Option<f64> {
        self.info.fps
    }
}

impl Drop for FfmpegFrameSource {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        debug!("ffmpeg: {} liberado tras {} frames", self.target, self.frames_read);
    }
}
