use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use weapon_watch::adapters::{
    ffmpeg::media::FfmpegMedia,
    fs::output_dir::OutputDir,
    http::{
        router,
        state::{HttpSettings, HttpState},
    },
    mail::smtp_notifier::SmtpNotifier,
    onnx::{annotate::Annotator, detector::OnnxDetector, model_catalog::OnnxModelCatalog},
};
use weapon_watch::application::{
    alert_service::AlertDispatcher,
    detection_state::DetectionState,
    ports::{MediaPort, NotifierPort},
    services::{BatchService, DetectionService},
};
use weapon_watch::config::AppConfig;
use weapon_watch::domain::model::ModelId;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Variables de entorno (.env opcional) y logs (RUST_LOG=info por defecto)
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = AppConfig::from_env().context("configuración inválida")?;
    tracing::info!("🔧 Inicializando adaptadores de infraestructura...");

    // 2. Modelo: el propio si existe y carga, si no el de respaldo. Sin modelo no arrancamos.
    let catalog = OnnxModelCatalog::new();
    let class_names = catalog.load_class_names(cfg.class_names_path.as_deref())?;
    let primary = ModelId { name: "weapons".into(), onnx_path: cfg.model_path.clone() };
    let fallback = ModelId { name: "fallback".into(), onnx_path: cfg.fallback_model_path.clone() };
    let (model, engine) = catalog.load_with_fallback(&primary, &fallback, &class_names)?;
    tracing::info!("🧠 Modelo activo: {} ({})", model.name, model.onnx_path.display());

    let annotator = match &cfg.label_font_path {
        Some(path) => Annotator::with_font_file(path)?,
        None => Annotator::boxes_only(),
    };
    let detector = Arc::new(OnnxDetector::new(engine, cfg.yolo.clone(), annotator));

    // 3. Estado global y alertas
    let state = Arc::new(DetectionState::new());
    let notifier: Arc<dyn NotifierPort> = Arc::new(SmtpNotifier::new(cfg.mail.clone()));
    if !notifier.is_configured() {
        tracing::warn!("✉️ Credenciales de email incompletas: las alertas sólo quedarán en el log");
    }
    let alerts = AlertDispatcher::spawn(
        state.clone(),
        cfg.alert_cooldown,
        notifier,
        &tokio::runtime::Handle::current(),
    );

    // 4. Servicios (casos de uso)
    let detection = DetectionService::new(
        detector,
        cfg.keywords.clone(),
        cfg.confidence_threshold,
        state,
        alerts,
    );
    let media: Arc<dyn MediaPort> = Arc::new(FfmpegMedia::new(
        cfg.ffmpeg_bin.clone(),
        cfg.ffprobe_bin.clone(),
        cfg.video_codec.clone(),
    ));
    let batch = Arc::new(BatchService::new(detection.clone(), media.clone(), cfg.video_sample_frames));
    let outputs = Arc::new(OutputDir::create(&cfg.upload_dir)?);

    // 5. Estado de la API y router
    let app = router(HttpState {
        detection,
        batch,
        media,
        outputs,
        settings: HttpSettings {
            camera_index: cfg.camera_index,
            jpeg_quality: cfg.jpeg_quality,
            image_response: cfg.image_response,
            max_upload_bytes: cfg.max_upload_bytes,
        },
    });

    // 6. Lanzar el servidor
    let addr = cfg.bind_addr();
    tracing::info!("🚀 Servidor de detección iniciado en http://{}", addr);
    tracing::info!("📂 Resultados servidos desde '{}'", cfg.upload_dir.display());

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
