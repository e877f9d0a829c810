use std::io::Cursor;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use image::{ImageFormat, RgbImage};
use serde_json::Value;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tower::ServiceExt;

use weapon_watch::adapters::{
    fs::output_dir::OutputDir,
    http::{
        router,
        state::{HttpSettings, HttpState},
    },
};
use weapon_watch::application::{
    alert_service::{Alert, AlertDispatcher},
    detection_state::DetectionState,
    ports::{DetectorPort, FrameSinkPort, FrameSourcePort, MediaPort},
    services::{BatchService, DetectionService},
};
use weapon_watch::config::ImageResponse;
use weapon_watch::domain::{
    detection::Detection,
    errors::{DomainError, DomainResult},
    frame::{Frame, Inference},
    keywords::WeaponKeywords,
    stream::StreamSource,
};

const BOUNDARY: &str = "XBOUNDARYX";

/// Detector que siempre devuelve las mismas detecciones y cuenta las llamadas.
struct FixedDetector {
    detections: Vec<Detection>,
    calls: AtomicUsize,
}

impl DetectorPort for FixedDetector {
    fn infer(&self, frame: &Frame) -> DomainResult<Inference> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Inference { annotated: frame.clone(), detections: self.detections.clone() })
    }
}

/// Ninguna cámara ni vídeo se puede abrir.
struct NoMedia;

impl MediaPort for NoMedia {
    fn open_stream(&self, source: &StreamSource) -> DomainResult<Box<dyn FrameSourcePort>> {
        Err(DomainError::SourceUnavailable(source.to_string()))
    }

    fn open_video(&self, path: &Path) -> DomainResult<Box<dyn FrameSourcePort>> {
        Err(DomainError::SourceUnavailable(path.display().to_string()))
    }

    fn create_video_writer(
        &self,
        path: &Path,
        _width: u32,
        _height: u32,
        _fps: f64,
    ) -> DomainResult<Box<dyn FrameSinkPort>> {
        Err(DomainError::OperationFailed(path.display().to_string()))
    }
}

/// Cámaras que emiten frames sin fin; anota qué fuente se abrió y cuándo se liberó.
#[derive(Default)]
struct LiveMedia {
    opened: std::sync::Mutex<Option<StreamSource>>,
    released: Arc<AtomicBool>,
}

struct EndlessSource {
    released: Arc<AtomicBool>,
}

impl FrameSourcePort for EndlessSource {
    fn read_frame(&mut self) -> DomainResult<Option<Frame>> {
        std::thread::sleep(Duration::from_millis(5));
        Ok(Some(RgbImage::from_pixel(8, 6, image::Rgb([200, 10, 10]))))
    }

    fn fps(&self) -> Option<f64> {
        Some(30.0)
    }
}

impl Drop for EndlessSource {
    fn drop(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

impl MediaPort for LiveMedia {
    fn open_stream(&self, source: &StreamSource) -> DomainResult<Box<dyn FrameSourcePort>> {
        *self.opened.lock().unwrap() = Some(source.clone());
        Ok(Box::new(EndlessSource { released: self.released.clone() }))
    }

    fn open_video(&self, path: &Path) -> DomainResult<Box<dyn FrameSourcePort>> {
        NoMedia.open_video(path)
    }

    fn create_video_writer(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        fps: f64,
    ) -> DomainResult<Box<dyn FrameSinkPort>> {
        NoMedia.create_video_writer(path, width, height, fps)
    }
}

struct Harness {
    app: Router,
    detector: Arc<FixedDetector>,
    state: Arc<DetectionState>,
    _alerts: mpsc::Receiver<Alert>,
    _dir: TempDir,
}

fn harness(detections: Vec<Detection>, image_response: ImageResponse) -> Harness {
    harness_with(detections, image_response, Arc::new(NoMedia))
}

fn harness_with(
    detections: Vec<Detection>,
    image_response: ImageResponse,
    media: Arc<dyn MediaPort>,
) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let detector = Arc::new(FixedDetector { detections, calls: AtomicUsize::new(0) });
    let state = Arc::new(DetectionState::new());
    let (tx, rx) = mpsc::channel(16);
    let alerts = AlertDispatcher::new(state.clone(), Duration::from_secs(30), tx);
    let detection = DetectionService::new(
        detector.clone(),
        WeaponKeywords::default(),
        0.25,
        state.clone(),
        alerts,
    );
    let batch = Arc::new(BatchService::new(detection.clone(), media.clone(), 100));
    let outputs = Arc::new(OutputDir::create(dir.path().join("uploads")).unwrap());

    let app = router(HttpState {
        detection,
        batch,
        media,
        outputs,
        settings: HttpSettings {
            camera_index: 0,
            jpeg_quality: 80,
            image_response,
            max_upload_bytes: 16 * 1024 * 1024,
        },
    });
    Harness { app, detector, state, _alerts: rx, _dir: dir }
}

fn knife() -> Detection {
    Detection { label: "knife".into(), confidence: 0.9, class_id: 43, x1: 1.0, y1: 1.0, x2: 5.0, y2: 5.0 }
}

fn png_bytes() -> Vec<u8> {
    let img = RgbImage::from_pixel(16, 12, image::Rgb([40, 80, 120]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

fn multipart(field: &str, filename: &str, data: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_of(res: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_reports_running() {
    let h = harness(vec![], ImageResponse::Json);
    let res = h.app.oneshot(get("/")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(json_of(res).await["message"], "Weapon Detection API running.");
}

#[tokio::test]
async fn status_reflects_shared_state() {
    let h = harness(vec![], ImageResponse::Json);
    let res = h.app.clone().oneshot(get("/detection-status")).await.unwrap();
    assert_eq!(json_of(res).await["detected"], false);

    h.state.set_detected(true);
    let res = h.app.oneshot(get("/detection-status")).await.unwrap();
    assert_eq!(json_of(res).await["detected"], true);
}

#[tokio::test]
async fn image_upload_returns_report_and_sets_state() {
    let h = harness(vec![knife()], ImageResponse::Json);
    let res = h.app.clone().oneshot(multipart("file", "photo.png", &png_bytes())).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let body = json_of(res).await;
    assert_eq!(body["detected"], true);
    assert_eq!(body["message"], "Weapon detected in image.");
    assert_eq!(body["output"], "/uploads/detected.jpg");
    assert_eq!(body["weapons"][0]["label"], "knife");
    assert_eq!(h.detector.calls.load(Ordering::SeqCst), 1);
    assert!(h.state.is_detected());

    // El resultado anotado queda disponible para descargar.
    let res = h.app.oneshot(get("/uploads/detected.jpg")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
    assert!(bytes.starts_with(&[0xFF, 0xD8]));
}

#[tokio::test]
async fn image_upload_can_return_the_annotated_jpeg() {
    let h = harness(vec![], ImageResponse::Image);
    let res = h.app.oneshot(multipart("file", "photo.png", &png_bytes())).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[header::CONTENT_TYPE], "image/jpeg");
    assert!(!h.state.is_detected());
}

#[tokio::test]
async fn unsupported_extension_is_rejected_before_detection() {
    let h = harness(vec![knife()], ImageResponse::Json);
    let res = h.app.oneshot(multipart("file", "notes.txt", b"hello")).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert!(json_of(res).await["error"].is_string());
    assert_eq!(h.detector.calls.load(Ordering::SeqCst), 0);
    assert!(!h.state.is_detected());
}

#[tokio::test]
async fn malformed_uploads_are_bad_requests() {
    let h = harness(vec![], ImageResponse::Json);
    let cases = [
        multipart("other", "photo.png", &png_bytes()),
        multipart("file", "", &png_bytes()),
        multipart("file", "photo.png", b""),
        multipart("file", "photo.png", b"definitely not a png"),
    ];
    for req in cases {
        let res = h.app.clone().oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
    assert!(!h.state.is_detected());
}

#[tokio::test]
async fn unreadable_video_is_a_bad_request() {
    let h = harness(vec![knife()], ImageResponse::Json);
    let res = h.app.oneshot(multipart("file", "clip.mp4", b"\x00\x00\x00\x18ftyp")).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    assert_eq!(h.detector.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn output_paths_cannot_escape_the_upload_dir() {
    let h = harness(vec![], ImageResponse::Json);
    let res = h.app.clone().oneshot(get("/uploads/..%2F..%2Fetc%2Fpasswd")).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);

    let res = h.app.oneshot(get("/uploads/missing.jpg")).await.unwrap();
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn cctv_requires_a_stream_url() {
    let h = harness(vec![], ImageResponse::Json);
    for uri in ["/cctv", "/cctv?stream=", "/cctv?stream=rtsp%3A%2F%2F10.0.0.9%2Flive"] {
        let res = h.app.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST, "{uri}");
    }
}

#[tokio::test]
async fn local_camera_unavailable_is_503() {
    let h = harness(vec![], ImageResponse::Json);
    let res = h.app.oneshot(get("/video")).await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert!(!h.state.is_detected());
}

async fn wait_for(flag: &AtomicBool) -> bool {
    for _ in 0..200 {
        if flag.load(Ordering::SeqCst) {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

#[tokio::test]
async fn camera_stream_emits_mjpeg_and_releases_on_disconnect() {
    let media = Arc::new(LiveMedia::default());
    let h = harness_with(vec![knife()], ImageResponse::Json, media.clone());

    let res = h.app.oneshot(get("/video")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()[header::CONTENT_TYPE], "multipart/x-mixed-replace; boundary=frame");
    assert_eq!(*media.opened.lock().unwrap(), Some(StreamSource::Camera(0)));

    let mut body = res.into_body().into_data_stream();
    let chunk = body.next().await.unwrap().unwrap();
    assert!(chunk.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\nContent-Length: "));
    let jpeg_at = chunk.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;
    assert_eq!(&chunk[jpeg_at..jpeg_at + 2], &[0xFF, 0xD8]);
    assert!(chunk.ends_with(b"\r\n"));
    assert!(h.state.is_detected());

    // El cliente se va: la captura debe soltarse sin esperar a que la fuente acabe.
    drop(body);
    assert!(wait_for(&media.released).await, "la fuente sigue abierta tras la desconexión");
}

#[tokio::test]
async fn cctv_stream_opens_the_requested_url() {
    let media = Arc::new(LiveMedia::default());
    let h = harness_with(vec![], ImageResponse::Json, media.clone());

    let res = h.app.oneshot(get("/cctv?stream=rtsp%3A%2F%2F10.0.0.9%2Flive")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(
        *media.opened.lock().unwrap(),
        Some(StreamSource::Url("rtsp://10.0.0.9/live".into()))
    );

    let mut body = res.into_body().into_data_stream();
    assert!(body.next().await.unwrap().unwrap().starts_with(b"--frame"));
    assert!(!h.state.is_detected());
    drop(body);
    assert!(wait_for(&media.released).await);
}
