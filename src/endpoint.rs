//! Service endpoint resolution: `<base url>/<service name>`.

use crate::config::ConfigError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointResolver {
    base_url: String,
}

impl EndpointResolver {
    /// Fails when the base URL is blank, so a misconfigured process stops at
    /// startup instead of on its first request.
    pub fn new(base_url: &str) -> Result<Self, ConfigError> {
        let base_url = base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(ConfigError::MissingBaseUrl);
        }
        Ok(Self {
            base_url: base_url.to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn resolve(&self, service: &str) -> String {
        format!("{}/{}", self.base_url, service)
    }
}
