//! Shared HTTP transport factory.
//!
//! Every client built here speaks JSON by default.

use crate::error::ClientError;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use std::time::Duration;

/// Default timeout for API calls (30 seconds).
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Media type the response interceptor unwraps.
pub const JSON_MEDIA_TYPE: &str = "application/json";

/// Create a new transport with the default timeout.
pub fn create_client() -> Result<Client, ClientError> {
    create_client_with_timeout(DEFAULT_TIMEOUT)
}

/// Create a new transport with a custom timeout.
pub fn create_client_with_timeout(timeout: Duration) -> Result<Client, ClientError> {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON_MEDIA_TYPE));

    Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .build()
        .map_err(ClientError::from)
}

/// True when a `Content-Type` value names JSON, ignoring parameters and case.
pub fn is_json_content_type(value: &str) -> bool {
    value
        .split(';')
        .next()
        .map(|essence| essence.trim().eq_ignore_ascii_case(JSON_MEDIA_TYPE))
        .unwrap_or(false)
}
