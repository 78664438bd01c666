//! Unified error handling for apiwire.
//!
//! Only 401 and 403 responses are interpreted by the client. Every other
//! failure is carried to the caller as-is.

use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
    /// The API base URL must be set before any endpoint is resolved.
    #[error("API base URL is not configured (set api.base_url or APIWIRE_API_ENDPOINT)")]
    MissingBaseUrl,
}

/// Unified error type for client, resource and query operations.
///
/// `Clone` so a single failed fetch can be handed to every waiter that
/// coalesced on the same cache entry.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    /// 401 on a protected endpoint. A background re-authentication has been
    /// scheduled by the time the caller sees this.
    #[error("Unauthenticated request to {url}")]
    Unauthenticated { url: String },
    /// 403. The session observer has already been notified.
    #[error("Access to {url} is forbidden")]
    Forbidden { url: String },
    /// Any other non-success status, passed through untouched.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Decode error: {0}")]
    Decode(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ClientError {
    /// HTTP status behind this error, when there is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthenticated { .. } => Some(401),
            Self::Forbidden { .. } => Some(403),
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Short machine-readable classification, used in log fields.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Unauthenticated { .. } => "unauthenticated",
            Self::Forbidden { .. } => "forbidden",
            Self::Http { .. } => "http_error",
            Self::Transport(_) => "transport_error",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Decode(_) => "decode_error",
            Self::Storage(_) => "storage_error",
            Self::Config(_) => "configuration_error",
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<ConfigError> for ClientError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthenticated_reports_401() {
        let err = ClientError::Unauthenticated { url: "http://api/widgets".to_string() };
        assert_eq!(err.status(), Some(401));
        assert_eq!(err.error_type(), "unauthenticated");
        assert!(err.to_string().contains("http://api/widgets"));
    }

    #[test]
    fn forbidden_reports_403() {
        let err = ClientError::Forbidden { url: "/secret".to_string() };
        assert_eq!(err.status(), Some(403));
        assert_eq!(err.error_type(), "forbidden");
    }

    #[test]
    fn http_error_keeps_status_and_body() {
        let err = ClientError::Http { status: 500, body: "boom".to_string() };
        assert_eq!(err.status(), Some(500));
        assert_eq!(err.to_string(), "HTTP 500: boom");
    }

    #[test]
    fn non_http_errors_have_no_status() {
        assert_eq!(ClientError::Transport("refused".to_string()).status(), None);
        assert_eq!(ClientError::Decode("eof".to_string()).status(), None);
    }

    #[test]
    fn config_error_converts_into_client_error() {
        let err: ClientError = ConfigError::MissingBaseUrl.into();
        assert_eq!(err.error_type(), "configuration_error");
        assert!(err.to_string().contains("base URL"));
    }

    #[test]
    fn error_implements_std_error() {
        fn assert_error<T: std::error::Error>() {}
        assert_error::<ClientError>();
        assert_error::<ConfigError>();
    }
}
