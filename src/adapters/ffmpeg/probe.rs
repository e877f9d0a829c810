//! Consulta de dimensiones y FPS con `ffprobe`.

use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tracing::warn;

use crate::adapters::ffmpeg::FfmpegInput;
use crate::domain::errors::{DomainError, DomainResult};

/// Tiempo máximo de una consulta a `ffprobe`, incluida la conexión a cámaras de red.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(15);

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Geometría de los frames tal y como los entrega ffmpeg, ya con la
/// rotación de la matriz de visualización aplicada.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoInfo {
    pub width: u32,
    pub height: u32,
    pub fps: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    #[serde(default)]
    tags: ProbeTags,
    #[serde(default)]
    side_data_list: Vec<ProbeSideData>,
}

#[derive(Debug, Default, Deserialize)]
struct ProbeTags {
    rotate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeSideData {
    rotation: Option<f64>,
}

impl ProbeStream {
    /// Grados de rotación: la matriz de visualización manda sobre la etiqueta antigua.
    fn rotation(&self) -> f64 {
        self.side_data_list
            .iter()
            .find_map(|sd| sd.rotation)
            .or_else(|| self.tags.rotate.as_deref().and_then(|r| r.trim().parse().ok()))
            .unwrap_or(0.0)
    }
}

pub fn probe_args(input: &FfmpegInput) -> Vec<String> {
    let mut args: Vec<String> = [
        "-v",
        "error",
        "-select_streams",
        "v:0",
        "-show_entries",
        "stream=width,height,avg_frame_rate,r_frame_rate:stream_tags=rotate:stream_side_data=rotation",
        "-of",
        "json",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    args.extend(input.input_args.iter().cloned());
    args.push(input.target.clone());
    args
}

pub fn probe(ffprobe: &str, input: &FfmpegInput) -> DomainResult<VideoInfo> {
    probe_with_timeout(ffprobe, input, PROBE_TIMEOUT)
}

pub fn probe_with_timeout(ffprobe: &str, input: &FfmpegInput, timeout: Duration) -> DomainResult<VideoInfo> {
    let mut cmd = Command::new(ffprobe);
    cmd.args(probe_args(input));
    let (status, stdout, stderr) = run_bounded(cmd, &input.target, timeout)?;
    if !status.success() {
        return Err(DomainError::Decode(format!(
            "ffprobe falló con {}: {}",
            input.target,
            String::from_utf8_lossy(&stderr).trim()
        )));
    }
    parse_probe_json(&stdout)
}

/// Ejecuta `cmd` recogiendo stdout/stderr; si no termina a tiempo se mata y
/// la fuente se considera no disponible.
fn run_bounded(
    mut cmd: Command,
    target: &str,
    timeout: Duration,
) -> DomainResult<(ExitStatus, Vec<u8>, Vec<u8>)> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| DomainError::OperationFailed(format!("no se pudo ejecutar {program}: {e}")))?;

    // Las tuberías se vacían en paralelo para que el hijo no se bloquee escribiendo.
    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    match wait_until(&mut child, Instant::now() + timeout) {
        Ok(Some(status)) => Ok((
            status,
            stdout.join().unwrap_or_default(),
            stderr.join().unwrap_or_default(),
        )),
        Ok(None) => {
            warn!("{} sin respuesta tras {:?} para {}", program, timeout, target);
            let _ = child.kill();
            let _ = child.wait();
            Err(DomainError::SourceUnavailable(format!(
                "{target} no respondió en {}s",
                timeout.as_secs()
            )))
        }
        Err(e) => {
            let _ = child.kill();
            let _ = child.wait();
            Err(DomainError::OperationFailed(format!("esperando a {program}: {e}")))
        }
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf);
        }
        buf
    })
}

fn wait_until(child: &mut Child, deadline: Instant) -> std::io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

pub fn parse_probe_json(raw: &[u8]) -> DomainResult<VideoInfo> {
    let parsed: ProbeOutput = serde_json::from_slice(raw)
        .map_err(|e| DomainError::Decode(format!("salida de ffprobe ilegible: {e}")))?;
    let stream = parsed
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| DomainError::Decode("sin pista de vídeo".into()))?;

    let (coded_w, coded_h) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(DomainError::Decode("dimensiones de vídeo desconocidas".into())),
    };

    // ffmpeg autorrota: con 90/270 grados los frames salen traspuestos.
    let quarter_turns = (stream.rotation() / 90.0).round() as i64;
    let (width, height) = if quarter_turns.rem_euclid(2) == 1 {
        (coded_h, coded_w)
    } else {
        (coded_w, coded_h)
    };

    let fps = stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .or_else(|| stream.r_frame_rate.as_deref().and_then(parse_rate));

    Ok(VideoInfo { width, height, fps })
}

/// `"30000/1001"` → 29.97; `"0/0"` o basura → `None`.
pub fn parse_rate(raw: &str) -> Option<f64> {
    let (num, den) = match raw.split_once('/') {
        Some((n, d)) => (n.trim().parse::<f64>().ok()?, d.trim().parse::<f64>().ok()?),
        None => (raw.trim().parse::<f64>().ok()?, 1.0),
    };
    let fps = num / den;
    (fps.is_finite() && fps > 0.0).then_some(fps)
}
