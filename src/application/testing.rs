//! Dobles de prueba para los puertos de la aplicación.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use crate::application::{
    alert_service::{Alert, AlertDispatcher},
    detection_state::DetectionState,
    ports::{DetectorPort, FrameSinkPort, FrameSourcePort, MediaPort},
    services::DetectionService,
};
use crate::domain::{
    detection::Detection,
    errors::{DomainError, DomainResult},
    frame::{Frame, Inference},
    keywords::{WeaponKeywords, DEFAULT_CONFIDENCE},
    stream::StreamSource,
};

pub fn det(label: &str, confidence: f32) -> Detection {
    Detection { label: label.into(), confidence, class_id: 0, x1: 0.0, y1: 0.0, x2: 2.0, y2: 2.0 }
}

/// Los frames sintéticos llevan su número de orden en el canal rojo.
pub fn frame_id(frame: &Frame) -> u8 {
    frame.get_pixel(0, 0)[0]
}

pub fn test_service(
    detector: Arc<dyn DetectorPort>,
) -> (DetectionService, Arc<DetectionState>, mpsc::Receiver<Alert>) {
    let state = Arc::new(DetectionState::new());
    let (tx, rx) = mpsc::channel(16);
    let alerts = AlertDispatcher::new(state.clone(), Duration::from_secs(30), tx);
    let svc = DetectionService::new(
        detector,
        WeaponKeywords::default(),
        DEFAULT_CONFIDENCE,
        state.clone(),
        alerts,
    );
    (svc, state, rx)
}

/// Devuelve detecciones según un guion, una entrada por llamada.
pub struct ScriptedDetector {
    script: Vec<Vec<Detection>>,
    repeat: bool,
    fail_past_end: bool,
    calls: AtomicUsize,
}

impl ScriptedDetector {
    pub fn new(script: Vec<Vec<Detection>>) -> Self {
        Self { script, repeat: false, fail_past_end: false, calls: AtomicUsize::new(0) }
    }

    pub fn always(detections: Vec<Detection>) -> Self {
        Self { script: vec![detections], repeat: true, fail_past_end: false, calls: AtomicUsize::new(0) }
    }

    pub fn failing_after(script: Vec<Vec<Detection>>) -> Self {
        Self { script, repeat: false, fail_past_end: true, calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl DetectorPort for ScriptedDetector {
    fn infer(&self, frame: &Frame) -> DomainResult<Inference> {
        let i = self.calls.fetch_add(1, Ordering::SeqCst);
        let detections = if self.repeat {
            self.script.first().cloned().unwrap_or_default()
        } else if let Some(d) = self.script.get(i) {
            d.clone()
        } else if self.fail_past_end {
            return Err(DomainError::Inference("fallo simulado".into()));
        } else {
            Vec::new()
        };
        Ok(Inference { annotated: frame.clone(), detections })
    }
}

#[derive(Default)]
struct MediaLog {
    read: AtomicUsize,
    written: Mutex<Vec<u8>>,
    finished: AtomicBool,
    released: AtomicBool,
    writer_params: Mutex<Option<(u32, u32, f64)>>,
}

/// Medio sintético: `frames` frames de 4x3 numerados desde 1.
pub struct FakeMedia {
    frames: usize,
    fps: Option<f64>,
    openable: bool,
    fail_read: bool,
    log: Arc<MediaLog>,
}

impl FakeMedia {
    pub fn with_frames(frames: usize) -> Self {
        Self { frames, fps: Some(25.0), openable: true, fail_read: false, log: Arc::default() }
    }

    pub fn unopenable() -> Self {
        Self { openable: false, ..Self::with_frames(0) }
    }

    /// Tras los frames, la lectura devuelve error en vez de fin de fuente.
    pub fn failing_read(self) -> Self {
        Self { fail_read: true, ..self }
    }

    pub fn fps(self, fps: Option<f64>) -> Self {
        Self { fps, ..self }
    }

    pub fn frames_read(&self) -> usize {
        self.log.read.load(Ordering::SeqCst)
    }

    pub fn written(&self) -> Vec<u8> {
        self.log.written.lock().unwrap().clone()
    }

    pub fn finished(&self) -> bool {
        self.log.finished.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> bool {
        self.log.released.load(Ordering::SeqCst)
    }

    pub fn writer_params(&self) -> Option<(u32, u32, f64)> {
        *self.log.writer_params.lock().unwrap()
    }

    fn source(&self) -> DomainResult<Box<dyn FrameSourcePort>> {
        if !self.openable {
            return Err(DomainError::SourceUnavailable("fuente simulada cerrada".into()));
        }
        Ok(Box::new(FakeSource {
            remaining: self.frames,
            next_id: 1,
            fps: self.fps,
            fail_read: self.fail_read,
            log: self.log.clone(),
        }))
    }
}

impl MediaPort for FakeMedia {
    fn open_stream(&self, _source: &StreamSource) -> DomainResult<Box<dyn FrameSourcePort>> {
        self.source()
    }

    fn open_video(&self, _path: &Path) -> DomainResult<Box<dyn FrameSourcePort>> {
        self.source()
    }

    fn create_video_writer(
        &self,
        _path: &Path,
        width: u32,
        height: u32,
        fps: f64,
    ) -> DomainResult<Box<dyn FrameSinkPort>> {
        *self.log.writer_params.lock().unwrap() = Some((width, height, fps));
        Ok(Box::new(FakeSink { log: self.log.clone() }))
    }
}

struct FakeSource {
    remaining: usize,
    next_id: usize,
    fps: Option<f64>,
    fail_read: bool,
    log: Arc<MediaLog>,
}

impl FrameSourcePort for FakeSource {
    fn read_frame(&mut self) -> DomainResult<Option<Frame>> {
        if self.remaining == 0 {
            if self.fail_read {
                return Err(DomainError::OperationFailed("lectura simulada fallida".into()));
            }
            return Ok(None);
        }
        self.remaining -= 1;
        self.log.read.fetch_add(1, Ordering::SeqCst);
        let id = self.next_id as u8;
        self.next_id += 1;
        Ok(Some(Frame::from_pixel(4, 3, image::Rgb([id, 0, 0]))))
    }

    fn fps(&self) -> Option<f64> {
        self.fps
    }
}

impl Drop for FakeSource {
    fn drop(&mut self) {
        self.log.released.store(true, Ordering::SeqCst);
    }
}

struct FakeSink {
    log: Arc<MediaLog>,
}

impl FrameSinkPort for FakeSink {
    fn write_frame(&mut self, frame: &Frame) -> DomainResult<()> {
        self.log.written.lock().unwrap().push(frame_id(frame));
        Ok(())
    }

    fn finish(self: Box<Self>) -> DomainResult<()> {
        self.log.finished.store(true, Ordering::SeqCst);
        Ok(())
    }
}
