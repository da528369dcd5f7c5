use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use vidpress_core::error::{ApiError, ErrorEnvelope};
use vidpress_transcoder::TranscodeError;

/// Newtype wrapper so we can implement `IntoResponse` in this crate.
pub struct AppError(pub ApiError);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let envelope = ErrorEnvelope::from(&self.0);
        (status, Json(envelope)).into_response()
    }
}

impl From<ApiError> for AppError {
    fn from(e: ApiError) -> Self {
        Self(e)
    }
}

impl From<TranscodeError> for AppError {
    fn from(e: TranscodeError) -> Self {
        let message = e.to_string();
        Self(match e {
            TranscodeError::InvalidInput(_) => ApiError::BadRequest(message),
            TranscodeError::AlreadyRunning(_) => ApiError::Conflict(message),
            TranscodeError::NoActiveJob(_) => ApiError::NotFound(message),
            TranscodeError::SpawnFailed(_)
            | TranscodeError::EncodeFailed { .. }
            | TranscodeError::ProbeFailed(_)
            | TranscodeError::Io(_) => ApiError::Internal(message),
        })
    }
}
