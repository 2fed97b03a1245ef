use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use common_types::{ErrorKind, ErrorResponse};
use thiserror::Error;
use uuid::Uuid;

use crate::balancer::BalancerError;
use crate::identity::IdentityError;
use crate::sessions::SessionSinkError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("failed to decode request: {0}")]
    RequestDecodingError(String),
    #[error("failed to parse request: {0}")]
    RequestParsingError(#[from] serde_json::Error),
    #[error("invalid session: {0}")]
    InvalidSession(String),
    #[error("session {0} was already recorded")]
    DuplicateSession(Uuid),

    #[error("no bearer token in request")]
    NoTokenError,
    #[error("bearer token is not valid")]
    TokenValidationError,

    #[error("counter store unavailable")]
    StorageUnavailable,
    #[error("identity store unavailable")]
    IdentityUnavailable,
    #[error("session store unavailable")]
    SessionStoreUnavailable,
}

impl ApiError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::RequestDecodingError(_)
            | ApiError::RequestParsingError(_)
            | ApiError::InvalidSession(_)
            | ApiError::DuplicateSession(_) => ErrorKind::BadRequest,

            ApiError::NoTokenError | ApiError::TokenValidationError => ErrorKind::Unauthorized,

            ApiError::StorageUnavailable
            | ApiError::IdentityUnavailable
            | ApiError::SessionStoreUnavailable => ErrorKind::Unavailable,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::DuplicateSession(_) => StatusCode::CONFLICT,
            _ => match self.kind() {
                ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
                ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
                ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.kind(),
            detail: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<BalancerError> for ApiError {
    fn from(e: BalancerError) -> Self {
        match e {
            BalancerError::StorageUnavailable(_) => ApiError::StorageUnavailable,
        }
    }
}

impl From<IdentityError> for ApiError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::MissingToken => ApiError::NoTokenError,
            IdentityError::InvalidToken => ApiError::TokenValidationError,
            IdentityError::Unavailable(cause) => {
                tracing::error!("identity provider unavailable: {}", cause);
                ApiError::IdentityUnavailable
            }
        }
    }
}

impl From<SessionSinkError> for ApiError {
    fn from(e: SessionSinkError) -> Self {
        match e {
            SessionSinkError::Invalid(reason) => ApiError::InvalidSession(reason),
            SessionSinkError::Duplicate(id) => ApiError::DuplicateSession(id),
            SessionSinkError::Unavailable(cause) => {
                tracing::error!("session sink unavailable: {}", cause);
                ApiError::SessionStoreUnavailable
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases = [
            (ApiError::NoTokenError, StatusCode::UNAUTHORIZED),
            (ApiError::TokenValidationError, StatusCode::UNAUTHORIZED),
            (ApiError::StorageUnavailable, StatusCode::SERVICE_UNAVAILABLE),
            (ApiError::IdentityUnavailable, StatusCode::SERVICE_UNAVAILABLE),
            (
                ApiError::InvalidSession("age".to_string()),
                StatusCode::BAD_REQUEST,
            ),
            (ApiError::DuplicateSession(Uuid::nil()), StatusCode::CONFLICT),
        ];

        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }

    #[test]
    fn test_store_errors_collapse_to_unavailable() {
        let error: ApiError = BalancerError::StorageUnavailable("timed out".to_string()).into();
        assert_eq!(error.kind(), ErrorKind::Unavailable);

        let error: ApiError = IdentityError::InvalidToken.into();
        assert_eq!(error.kind(), ErrorKind::Unauthorized);

        let error: ApiError = SessionSinkError::Unavailable("down".to_string()).into();
        assert_eq!(error.kind(), ErrorKind::Unavailable);
    }
}
