use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tagpay_shared::{ReadFailure, SessionError};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("unknown bank '{0}'")]
    UnknownBank(String),
    #[error("tag worker failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
    #[error("tag session lock poisoned")]
    Poisoned,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Session(err) => match err {
                SessionError::NoTagPresent => StatusCode::NOT_FOUND,
                SessionError::Encode(_)
                | SessionError::CapacityExceeded { .. }
                | SessionError::Read(ReadFailure::Decode(_)) => StatusCode::UNPROCESSABLE_ENTITY,
                SessionError::WriteFailedAtBlock { .. }
                | SessionError::EraseFailedAtBlock { .. }
                | SessionError::Read(ReadFailure::NothingRead(_)) => StatusCode::BAD_GATEWAY,
            },
            ApiError::UnknownBank(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Worker(_) | ApiError::Poisoned => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", self);
        }
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
