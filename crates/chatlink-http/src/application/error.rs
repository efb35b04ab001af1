//! Maps session errors onto HTTP status codes.
//!
//! | Error               | Status |
//! |---------------------|--------|
//! | `BadRequest`        | 400    |
//! | `NotFound`          | 404    |
//! | `Timeout`           | 408    |
//! | `NotConnected`      | 409    |
//! | `AlreadyRegistered` | 409    |
//! | `LoggedOut`         | 410    |
//! | `Persistence`       | 500    |
//! | `Engine`            | 502    |
//! | `ShutDown`          | 503    |

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chatlink_core::SessionNameError;
use chatlink_sessions::SessionError;
use thiserror::Error;
use tracing::{error, warn};

use crate::domain::messages::ErrorBody;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Session(#[from] SessionError),
}

impl From<SessionNameError> for ApiError {
    fn from(err: SessionNameError) -> Self {
        Self::BadRequest(format!("invalid session name: {err}"))
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Session(err) => match err {
                SessionError::NotFound(_) => StatusCode::NOT_FOUND,
                SessionError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
                SessionError::NotConnected(_) | SessionError::AlreadyRegistered(_) => {
                    StatusCode::CONFLICT
                }
                SessionError::LoggedOut(_) => StatusCode::GONE,
                SessionError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
                SessionError::Engine(_) => StatusCode::BAD_GATEWAY,
                SessionError::ShutDown(_) => StatusCode::SERVICE_UNAVAILABLE,
            },
        }
    }

    /// Stable machine-readable kind, used as `error` in the body.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BadRequest(_) => "BadRequest",
            Self::Session(err) => match err {
                SessionError::NotFound(_) => "NotFound",
                SessionError::Timeout(_) => "Timeout",
                SessionError::NotConnected(_) => "NotConnected",
                SessionError::AlreadyRegistered(_) => "AlreadyRegistered",
                SessionError::LoggedOut(_) => "LoggedOut",
                SessionError::Persistence(_) => "PersistenceError",
                SessionError::Engine(_) => "EngineError",
                SessionError::ShutDown(_) => "ShutDown",
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %self, "request failed");
        } else {
            warn!(status = status.as_u16(), error = %self, "request rejected");
        }
        let body = ErrorBody {
            error: self.kind().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chatlink_core::SessionName;

    use super::*;

    fn name() -> SessionName {
        SessionName::parse("alice").unwrap()
    }

    #[test]
    fn test_timeout_maps_to_408() {
        let err = ApiError::from(SessionError::Timeout(Duration::from_secs(15)));
        assert_eq!(err.status(), StatusCode::REQUEST_TIMEOUT);
        assert_eq!(err.kind(), "Timeout");
    }

    #[test]
    fn test_not_found_maps_to_404() {
        let err = ApiError::from(SessionError::NotFound(name()));
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_logged_out_is_distinct_from_transient_states() {
        let err = ApiError::from(SessionError::LoggedOut(name()));
        assert_eq!(err.status(), StatusCode::GONE);
        assert_eq!(err.kind(), "LoggedOut");
    }

    #[test]
    fn test_invalid_name_is_bad_request() {
        let err = ApiError::from(SessionName::parse("").unwrap_err());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
