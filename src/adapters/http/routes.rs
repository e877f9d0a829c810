use std::path::PathBuf;

use axum::{
    extract::{multipart::Field, Multipart, Path, Request, State},
    http::header::CONTENT_TYPE,
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use tower::ServiceExt;
use tower_http::services::ServeFile;
use tracing::{info, warn};

use crate::adapters::fs::output_dir::{OutputDir, IMAGE_OUTPUT, VIDEO_OUTPUT};
use crate::adapters::http::{error::ApiError, state::HttpState};
use crate::application::dto::{ImageReport, MessageResponse, StatusResponse, VideoReport};
use crate::config::ImageResponse;
use crate::domain::{
    errors::DomainError,
    media::{extension_of, MediaKind},
};

/// Nombre del campo multipart que transporta el archivo.
pub const UPLOAD_FIELD: &str = "file";

pub async fn health() -> Json<MessageResponse> {
    Json(MessageResponse { message: "Weapon Detection API running.".into() })
}

pub async fn detection_status(State(st): State<HttpState>) -> Json<StatusResponse> {
    Json(StatusResponse { detected: st.detection.is_detected() })
}

struct Upload {
    filename: String,
    bytes: Bytes,
}

async fn read_upload(multipart: &mut Multipart) -> Result<Upload, ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::new(e.status(), e.body_text()))?
    {
        if field.name() == Some(UPLOAD_FIELD) {
            return read_field(field).await;
        }
    }
    Err(ApiError::bad_request("No file part in the request."))
}

async fn read_field(field: Field<'_>) -> Result<Upload, ApiError> {
    let filename = field
        .file_name()
        .map(str::trim)
        .unwrap_or_default()
        .to_string();
    if filename.is_empty() {
        return Err(ApiError::bad_request("No selected file."));
    }
    let bytes = field
        .bytes()
        .await
        .map_err(|e| ApiError::new(e.status(), e.body_text()))?;
    if bytes.is_empty() {
        return Err(ApiError::bad_request("Uploaded file is empty."));
    }
    Ok(Upload { filename, bytes })
}

/// `POST /upload`: imagen o vídeo. El tipo se decide por la extensión, antes
/// de guardar nada en disco o invocar al detector.
pub async fn upload(State(st): State<HttpState>, mut multipart: Multipart) -> Result<Response, ApiError> {
    let upload = read_upload(&mut multipart).await?;

    let (kind, ext) = match (MediaKind::from_filename(&upload.filename), extension_of(&upload.filename)) {
        (Some(kind), Some(ext)) => (kind, ext),
        _ => {
            warn!("Subida rechazada por extensión: {}", upload.filename);
            return Err(ApiError::from(DomainError::Unsupported(upload.filename)));
        }
    };
    info!("📥 Subida recibida: {} ({} bytes, {:?})", upload.filename, upload.bytes.len(), kind);

    let outputs = st.outputs.clone();
    let batch = st.batch.clone();
    let bytes = upload.bytes;

    match kind {
        MediaKind::Image => {
            let outcome = tokio::task::spawn_blocking(move || {
                let tmp = outputs.store_upload(&bytes, &ext)?;
                batch.detect_image(tmp.path(), &outputs.image_output())
            })
            .await
            .map_err(join_error)??;

            match st.settings.image_response {
                ImageResponse::Json => Ok(Json(ImageReport::from_outcome(
                    outcome,
                    OutputDir::public_url(IMAGE_OUTPUT),
                ))
                .into_response()),
                ImageResponse::Image => annotated_image(outcome.output).await,
            }
        }
        MediaKind::Video => {
            let outcome = tokio::task::spawn_blocking(move || {
                let tmp = outputs.store_upload(&bytes, &ext)?;
                batch.detect_video(tmp.path(), &outputs.video_output())
            })
            .await
            .map_err(join_error)??;

            Ok(Json(VideoReport::from_outcome(outcome, OutputDir::public_url(VIDEO_OUTPUT))).into_response())
        }
    }
}

async fn annotated_image(path: PathBuf) -> Result<Response, ApiError> {
    let data = tokio::fs::read(&path).await.map_err(|e| {
        ApiError::from(DomainError::OperationFailed(format!("{}: {e}", path.display())))
    })?;
    Ok(([(CONTENT_TYPE, "image/jpeg")], data).into_response())
}

/// `GET /uploads/:name`: sirve un resultado anotado.
pub async fn serve_output(
    State(st): State<HttpState>,
    Path(name): Path<String>,
    req: Request,
) -> Result<Response, ApiError> {
    let path = st.outputs.resolve(&name)?;
    match ServeFile::new(path).oneshot(req).await {
        Ok(res) => Ok(res.into_response()),
        Err(e) => Err(ApiError::from(DomainError::OperationFailed(e.to_string()))),
    }
}

fn join_error(e: tokio::task::JoinError) -> ApiError {
    ApiError::from(DomainError::OperationFailed(format!("tarea de detección abortada: {e}")))
}
