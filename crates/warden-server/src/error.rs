use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use warden_events::EventError;
use warden_storage::StorageError;

use crate::rest::types::ErrorResponse;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Event(#[from] EventError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            // unknown codes are invalid input, not a denial and not a
            // server fault
            ApiError::Storage(StorageError::UnknownResourceCode(_))
            | ApiError::Storage(StorageError::UnknownActionCode { .. }) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::Storage(_) | ApiError::Event(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}
