//! Request handlers.

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;

use super::error::ApiError;
use super::AppState;

/// Multipart field carrying the upload.
pub const IMAGE_FIELD: &str = "image";

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub caption: String,
}

/// `POST /predict`: caption the uploaded `image` field.
///
/// A request that is not multipart at all is treated like one without an
/// image.
pub async fn predict(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let mut multipart = multipart.map_err(|_| ApiError::NoImage)?;

    let mut image = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some(IMAGE_FIELD) {
            image = Some(field.bytes().await?);
            break;
        }
        // Drain unrelated fields so the stream can advance.
        field.bytes().await?;
    }
    let bytes = image.ok_or(ApiError::NoImage)?;

    tracing::debug!("Received image upload ({} bytes)", bytes.len());
    let caption = state
        .captioner
        .clone()
        .caption_bytes_async(bytes.to_vec())
        .await?;

    tracing::info!("Caption: {:?}", caption.text);
    Ok(Json(PredictResponse {
        caption: caption.text,
    }))
}

/// `GET /health`
pub async fn health() -> &'static str {
    "ok"
}
