//! Per-resource CRUD operations bound to one service endpoint.
//!
//! `ResourceService` does URL concatenation and parameter forwarding only.
//! Authentication, unwrapping and error handling belong to the client.

use crate::client::{HttpClient, RequestConfig, ResponseBody};
use crate::error::ClientError;
use serde_json::Value;

/// Everything needed to issue one call against a resource.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestDescriptor {
    /// Path suffix appended to the service endpoint, e.g. `/items`.
    pub url: String,
    pub params: Vec<(String, String)>,
    pub body: Option<Value>,
    pub config: RequestConfig,
    /// Resource identifier, used by delete.
    pub id: Option<String>,
}

impl RequestDescriptor {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Self::default()
        }
    }

    pub fn param(mut self, name: &str, value: &str) -> Self {
        self.params.push((name.to_string(), value.to_string()));
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn config(mut self, config: RequestConfig) -> Self {
        self.config = config;
        self
    }

    pub fn id(mut self, id: impl ToString) -> Self {
        self.id = Some(id.to_string());
        self
    }

    /// Copy of this descriptor carrying `body` instead of its own.
    pub fn with_body(&self, body: Option<Value>) -> Self {
        Self {
            body,
            ..self.clone()
        }
    }

    /// Query params sent on the wire. Descriptor params replace the
    /// config's own when any are set.
    pub fn query_params(&self) -> &[(String, String)] {
        if self.params.is_empty() {
            &self.config.params
        } else {
            &self.params
        }
    }

    /// Per-call config with the effective query params applied.
    fn request_config(&self) -> RequestConfig {
        let mut config = self.config.clone();
        config.params = self.query_params().to_vec();
        config
    }
}

#[derive(Clone)]
pub struct ResourceService {
    client: HttpClient,
    endpoint: String,
}

impl ResourceService {
    pub fn new(client: HttpClient, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    /// `<endpoint><url>`
    pub fn target_url(&self, descriptor: &RequestDescriptor) -> String {
        format!("{}{}", self.endpoint, descriptor.url)
    }

    /// `<endpoint><url>/<id>`
    pub fn delete_url(&self, descriptor: &RequestDescriptor) -> Result<String, ClientError> {
        let id = descriptor
            .id
            .as_deref()
            .ok_or_else(|| ClientError::InvalidRequest(format!("delete of {} requires an id", self.target_url(descriptor))))?;
        Ok(format!("{}/{}", self.target_url(descriptor), id))
    }

    pub async fn get(&self, descriptor: &RequestDescriptor) -> Result<ResponseBody, ClientError> {
        self.client
            .get(&self.target_url(descriptor), descriptor.request_config())
            .await
    }

    pub async fn post(&self, descriptor: &RequestDescriptor) -> Result<ResponseBody, ClientError> {
        self.client
            .post(&self.target_url(descriptor), descriptor.body.as_ref(), descriptor.request_config())
            .await
    }

    pub async fn put(&self, descriptor: &RequestDescriptor) -> Result<ResponseBody, ClientError> {
        self.client
            .put(&self.target_url(descriptor), descriptor.body.as_ref(), descriptor.request_config())
            .await
    }

    pub async fn patch(&self, descriptor: &RequestDescriptor) -> Result<ResponseBody, ClientError> {
        self.client
            .patch(&self.target_url(descriptor), descriptor.body.as_ref(), descriptor.request_config())
            .await
    }

    /// Never sends a body.
    pub async fn delete(&self, descriptor: &RequestDescriptor) -> Result<ResponseBody, ClientError> {
        let url = self.delete_url(descriptor)?;
        self.client.delete(&url, descriptor.request_config()).await
    }
}
