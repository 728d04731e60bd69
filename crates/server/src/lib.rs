//! HTTP API for the banking appointment assistant
//!
//! Provides:
//! - JSON endpoints for login, chat turns, suggestions and greetings
//! - Auth-gated CRM passthroughs (appointments, banker notes, visits)
//! - Signed-cookie sessions with idle expiry
//! - Prometheus metrics at `/metrics`

pub mod auth;
pub mod http;
pub mod metrics;
pub mod session;
pub mod state;

pub use http::create_router;
pub use metrics::init_metrics;
pub use session::{Session, SessionManager};
pub use state::AppState;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bankbot_core::ErrorKind;
use serde::Serialize;

/// Message returned for upstream failures; details stay in the logs
const UPSTREAM_MESSAGE: &str = "Something went wrong while processing your request. Please try again.";

/// Server error
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error(transparent)]
    Core(#[from] bankbot_core::Error),

    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    #[error("Startup error: {0}")]
    Startup(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    fn kind(&self) -> ErrorKind {
        match self {
            Self::Core(e) => e.kind(),
            Self::InvalidBody(_) => ErrorKind::Validation,
            Self::Startup(_) => ErrorKind::Configuration,
            Self::Internal(_) => ErrorKind::Upstream,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            Self::Core(e) => e.code(),
            other => other.kind().code(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Validation | ErrorKind::InvalidDateTime => StatusCode::BAD_REQUEST,
            ErrorKind::SessionExpired | ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Upstream | ErrorKind::Configuration => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error body sent to clients
#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    recovery: bool,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = self.status();
        let error = match kind {
            ErrorKind::Upstream => {
                tracing::error!(error = %self, "Upstream failure");
                UPSTREAM_MESSAGE.to_string()
            }
            ErrorKind::Configuration => {
                tracing::error!(error = %self, "Configuration failure");
                "Server configuration error".to_string()
            }
            _ => {
                tracing::debug!(error = %self, status = %status, "Request rejected");
                self.to_string()
            }
        };

        let body = ErrorBody {
            error,
            code: self.code(),
            recovery: kind.is_recoverable(),
        };
        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;
    use bankbot_core::Error;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (Error::MissingParameters("query".into()), StatusCode::BAD_REQUEST),
            (
                Error::InvalidDateTime {
                    date: "x".into(),
                    time: "y".into(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (Error::SessionExpired, StatusCode::UNAUTHORIZED),
            (Error::Unauthorized("no".into()), StatusCode::UNAUTHORIZED),
            (Error::NotFound("a0A".into()), StatusCode::NOT_FOUND),
            (Error::Crm("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (Error::Llm("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ServerError::from(err).status(), status);
        }
    }

    #[test]
    fn test_codes() {
        assert_eq!(
            ServerError::from(Error::MissingParameters("q".into())).code(),
            "MISSING_PARAMETERS"
        );
        assert_eq!(ServerError::InvalidBody("eof".into()).code(), "VALIDATION_ERROR");
        let aborted = ServerError::Internal("join".into());
        assert_eq!(aborted.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(aborted.code(), "UPSTREAM_ERROR");
    }
}
