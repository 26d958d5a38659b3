use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

use crate::core::ServiceError;

/// Non-standard status used for requests abandoned by the client.
const CLIENT_CLOSED_REQUEST: u16 = 499;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

#[derive(Debug, Error)]
pub enum WebError {
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error(transparent)]
    InvalidJson(#[from] JsonRejection),
}

pub type Result<T> = std::result::Result<T, WebError>;

pub fn status_for(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::InvalidArgument(_)
        | ServiceError::InvalidPayload(_)
        | ServiceError::MissingIdentifier => StatusCode::BAD_REQUEST,
        ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
        ServiceError::AlreadyExists(_) => StatusCode::CONFLICT,
        ServiceError::Cancelled => StatusCode::from_u16(CLIENT_CLOSED_REQUEST)
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
        ServiceError::EventPublish(_) => StatusCode::SERVICE_UNAVAILABLE,
        ServiceError::Initialization(_) | ServiceError::Persistence(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let (status, message, code) = match self {
            WebError::Service(err) => (status_for(&err), err.to_string(), err.code().to_string()),
            WebError::Unauthorized(msg) => {
                (StatusCode::UNAUTHORIZED, msg, "unauthenticated".to_string())
            }
            WebError::InvalidJson(rejection) => (
                rejection.status(),
                rejection.body_text(),
                "invalid_json".to_string(),
            ),
        };

        let body = Json(ErrorResponse {
            error: message,
            code,
        });

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StorageError;

    #[test]
    fn service_errors_map_to_http_statuses() {
        let cases = [
            (ServiceError::unspecified_id(), 400),
            (ServiceError::InvalidPayload("bad".into()), 400),
            (ServiceError::MissingIdentifier, 400),
            (ServiceError::not_found("record"), 404),
            (ServiceError::AlreadyExists("record".into()), 409),
            (ServiceError::Cancelled, 499),
            (ServiceError::EventPublish("closed".into()), 503),
            (
                ServiceError::Persistence(StorageError::Unavailable("down".into())),
                500,
            ),
        ];

        for (err, expected) in cases {
            assert_eq!(status_for(&err).as_u16(), expected, "{err}");
        }
    }

    #[test]
    fn unauthorized_renders_401() {
        let response = WebError::Unauthorized("bad token".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}
