//! Request and response values exchanged with [`super::HttpClient`].

use crate::error::ClientError;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

/// Per-call options. Every field is optional; the default sends nothing extra.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestConfig {
    pub headers: Vec<(String, String)>,
    pub params: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl RequestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn param(mut self, name: &str, value: &str) -> Self {
        self.params.push((name.to_string(), value.to_string()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A response the interceptor did not unwrap.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// What a successful call resolves to: the parsed JSON body, or the whole
/// response when it was not JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Json(Value),
    Raw(RawResponse),
}

impl ResponseBody {
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Raw(_) => None,
        }
    }

    pub fn as_raw(&self) -> Option<&RawResponse> {
        match self {
            Self::Json(_) => None,
            Self::Raw(raw) => Some(raw),
        }
    }

    /// Deserialize into `T`. Raw bodies are parsed as JSON text.
    pub fn into_json<T: DeserializeOwned>(self) -> Result<T, ClientError> {
        match self {
            Self::Json(value) => serde_json::from_value(value).map_err(|e| ClientError::Decode(e.to_string())),
            Self::Raw(raw) => serde_json::from_str(&raw.body).map_err(|e| ClientError::Decode(e.to_string())),
        }
    }
}
