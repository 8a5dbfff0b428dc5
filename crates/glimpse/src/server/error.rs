//! HTTP error responses.
//!
//! Every failure leaves the service as `{"error": "<message>"}`.

use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use glimpse_core::CaptionError;
use serde::Serialize;

pub const NO_IMAGE_MESSAGE: &str = "No image uploaded";

#[derive(Debug)]
pub enum ApiError {
    /// The request carried no `image` field.
    NoImage,
    /// The multipart body could not be read.
    Multipart { status: StatusCode, message: String },
    /// Decoding or inference failed for this request.
    Caption(CaptionError),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NoImage => StatusCode::BAD_REQUEST,
            ApiError::Multipart { status, .. } => *status,
            ApiError::Caption(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(self) -> String {
        match self {
            ApiError::NoImage => NO_IMAGE_MESSAGE.to_string(),
            ApiError::Multipart { message, .. } => message,
            ApiError::Caption(e) => e.to_string(),
        }
    }
}

impl From<CaptionError> for ApiError {
    fn from(e: CaptionError) -> Self {
        ApiError::Caption(e)
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        ApiError::Multipart {
            status: e.status(),
            message: e.body_text(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = self.message();
        if status.is_server_error() {
            tracing::error!("Request failed ({}): {}", status, message);
        } else {
            tracing::warn!("Request rejected ({}): {}", status, message);
        }
        (status, Json(ErrorBody { error: message })).into_response()
    }
}
