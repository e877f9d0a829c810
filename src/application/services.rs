use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::application::{
    alert_service::AlertDispatcher,
    detection_state::DetectionState,
    ports::{DetectorPort, FrameSinkPort, FrameSourcePort, MediaPort},
};
use crate::domain::{
    detection::Detection,
    errors::{DomainError, DomainResult},
    frame::Frame,
    keywords::WeaponKeywords,
    stream::summarize_detections,
};

/// FPS del vídeo de salida cuando la fuente no lo informa.
pub const DEFAULT_VIDEO_FPS: f64 = 20.0;

/// Resultado de detector + clasificador sobre un frame, sin tocar el estado compartido.
#[derive(Debug, Clone)]
pub struct FrameAnalysis {
    pub annotated: Frame,
    pub detections: Vec<Detection>,
    pub weapon_found: bool,
}

/// Núcleo común de los pipelines: inferencia, clasificación por palabras clave,
/// actualización del estado compartido y disparo de alertas.
#[derive(Clone)]
pub struct DetectionService {
    detector: Arc<dyn DetectorPort>,
    keywords: Arc<WeaponKeywords>,
    confidence: f32,
    state: Arc<DetectionState>,
    alerts: AlertDispatcher,
}

impl DetectionService {
    pub fn new(
        detector: Arc<dyn DetectorPort>,
        keywords: WeaponKeywords,
        confidence: f32,
        state: Arc<DetectionState>,
        alerts: AlertDispatcher,
    ) -> Self {
        Self {
            detector,
            keywords: Arc::new(keywords),
            confidence,
            state,
            alerts,
        }
    }

    pub fn analyze(&self, frame: &Frame) -> DomainResult<FrameAnalysis> {
        let inference = self.detector.infer(frame)?;
        let weapon_found = self.keywords.is_weapon(&inference.detections, self.confidence);
        Ok(FrameAnalysis {
            annotated: inference.annotated,
            detections: inference.detections,
            weapon_found,
        })
    }

    /// Publica el veredicto: sobrescribe el estado y, si es positivo, intenta alertar.
    pub fn publish(&self, weapon_found: bool, source: &str, detections: &[Detection]) {
        self.state.set_detected(weapon_found);
        if weapon_found {
            let weapons = self.weapons(detections);
            info!("⚠️ Arma detectada en {}: {}", source, summarize_detections(&weapons));
            self.alerts.maybe_alert(true, source, &weapons);
        }
    }

    pub fn weapons(&self, detections: &[Detection]) -> Vec<Detection> {
        self.keywords
            .weapon_detections(detections, self.confidence)
            .cloned()
            .collect()
    }

    pub fn is_detected(&self) -> bool {
        self.state.is_detected()
    }
}

#[derive(Debug, Clone)]
pub struct ImageOutcome {
    pub detected: bool,
    pub detections: Vec<Detection>,
    pub weapons: Vec<Detection>,
    pub output: PathBuf,
}

#[derive(Debug, Clone)]
pub struct VideoOutcome {
    pub detected: bool,
    pub frames_scanned: usize,
    /// Detecciones del frame que detuvo el muestreo; vacío si no hubo positivo.
    pub detections: Vec<Detection>,
    pub weapons: Vec<Detection>,
    pub output: PathBuf,
}

struct Scan {
    found: bool,
    frames: usize,
    detections: Vec<Detection>,
}

/// Pipeline por lotes: una imagen o el prefijo muestreado de un vídeo.
#[derive(Clone)]
pub struct BatchService {
    detection: DetectionService,
    media: Arc<dyn MediaPort>,
    sample_frames: usize,
}

impl BatchService {
    pub fn new(detection: DetectionService, media: Arc<dyn MediaPort>, sample_frames: usize) -> Self {
        Self { detection, media, sample_frames }
    }

    pub fn detect_image(&self, input: &Path, output: &Path) -> DomainResult<ImageOutcome> {
        let frame = image::open(input)
            .map_err(|e| DomainError::Decode(format!("no se puede leer la imagen: {e}")))?
            .to_rgb8();

        let analysis = self.detection.analyze(&frame)?;
        self.detection
            .publish(analysis.weapon_found, &source_label(input), &analysis.detections);

        analysis
            .annotated
            .save(output)
            .map_err(|e| DomainError::OperationFailed(format!("no se pudo guardar {}: {e}", output.display())))?;

        Ok(ImageOutcome {
            detected: analysis.weapon_found,
            weapons: self.detection.weapons(&analysis.detections),
            detections: analysis.detections,
            output: output.to_path_buf(),
        })
    }

    /// Recorre como mucho `sample_frames` frames; se detiene en el primer positivo.
    pub fn detect_video(&self, input: &Path, output: &Path) -> DomainResult<VideoOutcome> {
        let mut source = self.media.open_video(input)?;
        let fps = source
            .fps()
            .filter(|f| f.is_finite() && *f > 0.0)
            .unwrap_or(DEFAULT_VIDEO_FPS);

        let mut writer: Option<Box<dyn FrameSinkPort>> = None;
        let scanned = self.scan(source.as_mut(), &mut writer, output, fps);
        drop(source);

        // El escritor se cierra en cualquier caso para no dejar un ffmpeg colgado.
        let finished = writer.map(|w| w.finish()).unwrap_or(Ok(()));
        let scan = scanned?;
        finished?;

        if scan.frames == 0 {
            return Err(DomainError::Decode("el vídeo no contiene frames legibles".into()));
        }

        self.detection
            .publish(scan.found, &source_label(input), &scan.detections);

        info!(
            "Vídeo {}: {} frames analizados, arma={}",
            input.display(),
            scan.frames,
            scan.found
        );

        Ok(VideoOutcome {
            detected: scan.found,
            frames_scanned: scan.frames,
            weapons: self.detection.weapons(&scan.detections),
            detections: scan.detections,
            output: output.to_path_buf(),
        })
    }

    fn scan(
        &self,
        source: &mut dyn FrameSourcePort,
        writer: &mut Option<Box<dyn FrameSinkPort>>,
        output: &Path,
        fps: f64,
    ) -> DomainResult<Scan> {
        let mut frames = 0;
        while frames < self.sample_frames {
            let frame = match source.read_frame() {
                Ok(Some(f)) => f,
                Ok(None) => break,
                Err(e) => {
                    warn!("Lectura de vídeo interrumpida en el frame {}: {}", frames + 1, e);
                    break;
                }
            };
            frames += 1;

            let analysis = self.detection.analyze(&frame)?;

            if writer.is_none() {
                let (w, h) = analysis.annotated.dimensions();
                *writer = Some(self.media.create_video_writer(output, w, h, fps)?);
            }
            if let Some(sink) = writer.as_mut() {
                sink.write_frame(&analysis.annotated)?;
            }

            if analysis.weapon_found {
                debug!("Positivo en el frame {}; fin del muestreo", frames);
                return Ok(Scan { found: true, frames, detections: analysis.detections });
            }
        }
        Ok(Scan { found: false, frames, detections: Vec::new() })
    }
}

fn source_label(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string());
    format!("upload:{name}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::testing::{det, test_service, FakeMedia, ScriptedDetector};

    fn batch(detector: Arc<ScriptedDetector>, media: Arc<FakeMedia>, cap: usize) -> (BatchService, Arc<DetectionState>) {
        let (svc, state, _rx) = test_service(detector);
        (BatchService::new(svc, media, cap), state)
    }

    #[test]
    fn video_stops_at_first_positive_frame() {
        let mut script = vec![vec![det("person", 0.9)]; 4];
        script.push(vec![det("person", 0.8), det("knife", 0.7)]);
        script.extend(vec![vec![det("pistol", 0.99)]; 10]);
        let detector = Arc::new(ScriptedDetector::new(script));
        let media = Arc::new(FakeMedia::with_frames(100));
        let (svc, state) = batch(detector.clone(), media.clone(), 100);

        let out = svc.detect_video(Path::new("in.mp4"), Path::new("out.mp4")).unwrap();

        assert!(out.detected);
        assert_eq!(out.frames_scanned, 5);
        assert_eq!(out.detections, vec![det("person", 0.8), det("knife", 0.7)]);
        assert_eq!(out.weapons, vec![det("knife", 0.7)]);
        assert_eq!(media.written(), vec![1, 2, 3, 4, 5]);
        assert!(media.finished());
        assert_eq!(detector.calls(), 5);
        assert!(state.is_detected());
    }

    #[test]
    fn video_without_positives_writes_the_sampled_prefix() {
        let detector = Arc::new(ScriptedDetector::always(vec![det("person", 0.9)]));
        let media = Arc::new(FakeMedia::with_frames(150));
        let (svc, state) = batch(detector.clone(), media.clone(), 100);
        state.set_detected(true);

        let out = svc.detect_video(Path::new("in.mp4"), Path::new("out.mp4")).unwrap();

        assert!(!out.detected);
        assert_eq!(out.frames_scanned, 100);
        assert!(out.detections.is_empty());
        assert_eq!(media.written(), (1..=100).collect::<Vec<u8>>());
        assert_eq!(media.frames_read(), 100);
        assert!(!state.is_detected());
    }

    #[test]
    fn short_video_is_fully_scanned() {
        let detector = Arc::new(ScriptedDetector::always(vec![]));
        let media = Arc::new(FakeMedia::with_frames(7));
        let (svc, _) = batch(detector, media.clone(), 100);

        let out = svc.detect_video(Path::new("in.mp4"), Path::new("out.mp4")).unwrap();
        assert_eq!(out.frames_scanned, 7);
        assert_eq!(media.written().len(), 7);
    }

    #[test]
    fn output_video_uses_source_fps_and_frame_size() {
        let detector = Arc::new(ScriptedDetector::always(vec![]));
        let media = Arc::new(FakeMedia::with_frames(2).fps(Some(12.5)));
        let (svc, _) = batch(detector, media.clone(), 100);
        svc.detect_video(Path::new("in.mp4"), Path::new("out.mp4")).unwrap();
        assert_eq!(media.writer_params(), Some((4, 3, 12.5)));

        let media = Arc::new(FakeMedia::with_frames(2).fps(None));
        let (svc, _) = batch(Arc::new(ScriptedDetector::always(vec![])), media.clone(), 100);
        svc.detect_video(Path::new("in.mp4"), Path::new("out.mp4")).unwrap();
        assert_eq!(media.writer_params(), Some((4, 3, DEFAULT_VIDEO_FPS)));
    }

    #[test]
    fn empty_video_is_a_decode_error() {
        let media = Arc::new(FakeMedia::with_frames(0));
        let (svc, _) = batch(Arc::new(ScriptedDetector::always(vec![])), media, 100);
        let err = svc.detect_video(Path::new("in.mp4"), Path::new("out.mp4")).unwrap_err();
        assert!(matches!(err, DomainError::Decode(_)));
    }

    #[test]
    fn unopenable_video_is_a_request_error() {
        let media = Arc::new(FakeMedia::unopenable());
        let (svc, _) = batch(Arc::new(ScriptedDetector::always(vec![])), media, 100);
        let err = svc.detect_video(Path::new("in.mp4"), Path::new("out.mp4")).unwrap_err();
        assert!(matches!(err, DomainError::SourceUnavailable(_)));
    }

    #[test]
    fn inference_failure_still_finishes_the_writer() {
        let detector = Arc::new(ScriptedDetector::failing_after(vec![vec![]; 2]));
        let media = Arc::new(FakeMedia::with_frames(10));
        let (svc, _) = batch(detector, media.clone(), 100);
        let err = svc.detect_video(Path::new("in.mp4"), Path::new("out.mp4")).unwrap_err();
        assert!(matches!(err, DomainError::Inference(_)));
        assert_eq!(media.written(), vec![1, 2]);
        assert!(media.finished());
    }

    #[test]
    fn image_is_annotated_and_persisted() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        Frame::from_pixel(8, 6, image::Rgb([9, 9, 9])).save(&input).unwrap();
        let output = dir.path().join("detected.jpg");

        let detector = Arc::new(ScriptedDetector::always(vec![det("Pistol", 0.4), det("person", 0.9)]));
        let (svc, state) = batch(detector, Arc::new(FakeMedia::with_frames(0)), 100);

        let out = svc.detect_image(&input, &output).unwrap();
        assert!(out.detected);
        assert_eq!(out.detections.len(), 2);
        assert_eq!(out.weapons, vec![det("Pistol", 0.4)]);
        assert!(state.is_detected());

        let saved = image::open(&output).unwrap();
        assert_eq!((saved.width(), saved.height()), (8, 6));
    }

    #[test]
    fn unreadable_image_is_a_decode_error() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("broken.jpg");
        std::fs::write(&input, b"not an image").unwrap();
        let detector = Arc::new(ScriptedDetector::always(vec![]));
        let (svc, _) = batch(detector.clone(), Arc::new(FakeMedia::with_frames(0)), 100);

        let err = svc.detect_image(&input, &dir.path().join("detected.jpg")).unwrap_err();
        assert!(matches!(err, DomainError::Decode(_)));
        assert_eq!(detector.calls(), 0);
    }

    #[test]
    fn publish_resets_state_on_negative_verdict() {
        let detector = Arc::new(ScriptedDetector::always(vec![]));
        let (svc, state, mut rx) = test_service(detector);
        svc.publish(true, "camera:0", &[det("knife", 0.9)]);
        assert!(state.is_detected());
        assert!(rx.try_recv().is_ok());
        svc.publish(false, "camera:0", &[]);
        assert!(!state.is_detected());
        assert!(rx.try_recv().is_err());
    }
}
