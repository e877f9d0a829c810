pub mod error;
pub mod routes;
pub mod state;
pub mod stream;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::adapters::http::state::HttpState;

pub fn router(state: HttpState) -> Router {
    let body_limit = state.settings.max_upload_bytes;
    Router::new()
        .route("/", get(routes::health))
        .route("/detection-status", get(routes::detection_status))
        .route("/video", get(stream::video_feed))
        .route("/cctv", get(stream::cctv_feed))
        .route("/upload", post(routes::upload))
        .route("/uploads/:name", get(routes::serve_output))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
