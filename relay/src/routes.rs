use std::sync::Arc;

use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use frame_dream_common::frame::encode_base64;
use frame_dream_common::wire::{TransformResponse, IMAGE_FIELD};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::backend::{BackendError, Img2ImgClient};

pub struct AppState {
    pub backend: Img2ImgClient,
}

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("no 'image' field in upload")]
    MissingImage,
    #[error("invalid multipart upload: {0}")]
    Multipart(#[from] MultipartError),
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        warn!(error = %self, "relay request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(TransformResponse::error(self.to_string())),
        )
            .into_response()
    }
}

pub fn router(state: Arc<AppState>, max_upload_bytes: usize) -> Router {
    Router::new()
        .route("/", post(transform_upload))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn transform_upload(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Json<TransformResponse>, RelayError> {
    let upload = loop {
        let Some(field) = multipart.next_field().await? else {
            return Err(RelayError::MissingImage);
        };
        if field.name() == Some(IMAGE_FIELD) {
            break field.bytes().await?;
        }
    };
    info!(upload_bytes = upload.len(), "forwarding upload to backend");

    let image = state.backend.generate(encode_base64(&upload)).await?;
    Ok(Json(TransformResponse::success(image)))
}
