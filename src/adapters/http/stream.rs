use std::convert::Infallible;

use axum::{
    body::Body,
    extract::{Query, State},
    http::header::{CACHE_CONTROL, CONTENT_TYPE},
    response::Response,
};
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};

use crate::adapters::http::{error::ApiError, state::HttpState};
use crate::application::{dto::CctvQuery, live_stream::LiveStream};
use crate::domain::{
    errors::{DomainError, DomainResult},
    stream::{mjpeg_content_type, StreamSource},
};

/// Partes en vuelo entre el hilo de captura y el cliente. Con un buffer tan
/// corto, un cliente lento frena la captura en lugar de acumular frames.
const STREAM_BUFFER: usize = 2;

/// `GET /video`: cámara local.
pub async fn video_feed(State(st): State<HttpState>) -> Result<Response, ApiError> {
    let source = StreamSource::Camera(st.settings.camera_index);
    open_and_stream(st, source).await.map_err(ApiError::unavailable)
}

/// `GET /cctv?stream=<url>`: cámara de red.
pub async fn cctv_feed(
    State(st): State<HttpState>,
    Query(query): Query<CctvQuery>,
) -> Result<Response, ApiError> {
    let url = query
        .stream
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing 'stream' query parameter."))?;
    open_and_stream(st, StreamSource::Url(url)).await.map_err(ApiError::from)
}

async fn open_and_stream(st: HttpState, source: StreamSource) -> DomainResult<Response> {
    let media = st.media.clone();
    let detection = st.detection.clone();
    let quality = st.settings.jpeg_quality;

    // Abrir una cámara o un RTSP bloquea; se hace antes de responder para poder
    // devolver un error en vez de un stream vacío.
    let live = tokio::task::spawn_blocking(move || {
        LiveStream::open(media.as_ref(), &source, detection, quality)
    })
    .await
    .map_err(|e| DomainError::OperationFailed(format!("apertura abortada: {e}")))??;

    let (tx, rx) = mpsc::channel::<Result<Bytes, Infallible>>(STREAM_BUFFER);
    std::thread::Builder::new()
        .name("mjpeg-stream".into())
        .spawn(move || pump(live, tx))
        .map_err(|e| DomainError::OperationFailed(format!("no se pudo lanzar el hilo de stream: {e}")))?;

    Response::builder()
        .header(CONTENT_TYPE, mjpeg_content_type())
        .header(CACHE_CONTROL, "no-cache, no-store, must-revalidate")
        .body(Body::from_stream(ReceiverStream::new(rx)))
        .map_err(|e| DomainError::OperationFailed(e.to_string()))
}

/// Bucle del hilo de captura. Termina con la fuente o cuando el cliente se va
/// (el receptor se suelta y `blocking_send` falla); soltar `live` libera la fuente.
fn pump(live: LiveStream, tx: mpsc::Sender<Result<Bytes, Infallible>>) {
    for chunk in live {
        if tx.blocking_send(Ok(Bytes::from(chunk))).is_err() {
            debug!("[STREAM] Cliente desconectado");
            break;
        }
    }
    info!("🛑 [STREAM] Hilo de captura finalizado");
}
