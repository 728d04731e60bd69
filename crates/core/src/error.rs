//! Error types shared across the workspace
//!
//! Every failure that can reach an HTTP response carries an explicit
//! [`ErrorKind`]. The server maps kinds to status codes; nothing downstream
//! inspects message text.

use thiserror::Error;

/// Result alias using the shared error type
pub type Result<T> = std::result::Result<T, Error>;

/// Category of a failure, used to pick the HTTP status and error code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or malformed client input
    Validation,
    /// Date and time could not be combined into an instant
    InvalidDateTime,
    /// The session cookie refers to a session that no longer exists
    SessionExpired,
    /// No authenticated user on a protected route, or bad credentials
    Unauthorized,
    /// Referenced record does not exist
    NotFound,
    /// The language model or CRM failed
    Upstream,
    /// Startup configuration is missing or invalid
    Configuration,
}

impl ErrorKind {
    /// Stable machine-readable code sent to clients
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION_ERROR",
            Self::InvalidDateTime => "INVALID_DATETIME",
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::NotFound => "NOT_FOUND",
            Self::Upstream => "UPSTREAM_ERROR",
            Self::Configuration => "CONFIGURATION_ERROR",
        }
    }

    /// Whether the client can recover by starting a fresh session
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::SessionExpired)
    }
}

/// Shared error type
#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("Missing parameters: {0}")]
    MissingParameters(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid date or time: date={date:?}, time={time:?}")]
    InvalidDateTime { date: String, time: String },

    #[error("Session expired")]
    SessionExpired,

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("CRM error: {0}")]
    Crm(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingParameters(_) | Self::Validation(_) => ErrorKind::Validation,
            Self::InvalidDateTime { .. } => ErrorKind::InvalidDateTime,
            Self::SessionExpired => ErrorKind::SessionExpired,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Llm(_) | Self::Crm(_) => ErrorKind::Upstream,
            Self::Configuration(_) => ErrorKind::Configuration,
        }
    }

    /// Code sent to clients; missing parameters get their own code
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingParameters(_) => "MISSING_PARAMETERS",
            other => other.kind().code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(
            Error::MissingParameters("query".into()).kind(),
            ErrorKind::Validation
        );
        assert_eq!(Error::Llm("timeout".into()).kind(), ErrorKind::Upstream);
        assert_eq!(Error::Crm("500".into()).kind(), ErrorKind::Upstream);
        assert_eq!(Error::SessionExpired.kind(), ErrorKind::SessionExpired);
    }

    #[test]
    fn test_codes() {
        assert_eq!(Error::MissingParameters("q".into()).code(), "MISSING_PARAMETERS");
        assert_eq!(Error::Validation("bad".into()).code(), "VALIDATION_ERROR");
        let err = Error::InvalidDateTime {
            date: "bad".into(),
            time: "3:00 PM".into(),
        };
        assert_eq!(err.code(), "INVALID_DATETIME");
    }

    #[test]
    fn test_only_expired_sessions_are_recoverable() {
        assert!(ErrorKind::SessionExpired.is_recoverable());
        assert!(!ErrorKind::Unauthorized.is_recoverable());
        assert!(!ErrorKind::Upstream.is_recoverable());
    }
}
