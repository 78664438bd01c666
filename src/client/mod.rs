//! Authenticated HTTP client.
//!
//! Wraps a reqwest transport with an interceptor chain:
//! - request: attach `Authorization: Bearer <token>` from the token store
//! - response (success): unwrap JSON bodies, pass everything else through raw
//! - response (error): 401 schedules a background re-authentication, 403 is
//!   reported to the session observer, anything else propagates untouched
//!
//! The client is cheap to clone. Clones share the transport, the token
//! store, the retry counter and the list of in-flight re-authentications.

mod types;

pub use types::{RawResponse, RequestConfig, ResponseBody};

use crate::auth::{ReauthDecision, ReauthOutcome, ReauthPolicy, RetryCounter};
use crate::config::ApiConfig;
use crate::error::ClientError;
use crate::http::{create_client_with_timeout, is_json_content_type};
use crate::session::{SessionObserver, TracingObserver};
use crate::token_store::TokenStore;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method, Url};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

/// Settings for the 401 flow, fixed at construction.
#[derive(Debug)]
struct AuthSettings {
    login_url: String,
    login_route: String,
    public_endpoints: Vec<String>,
    policy: ReauthPolicy,
}

#[derive(Clone)]
pub struct HttpClient {
    http: Client,
    tokens: Arc<dyn TokenStore>,
    observer: Arc<dyn SessionObserver>,
    auth: Arc<AuthSettings>,
    retry: Arc<Mutex<RetryCounter>>,
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl HttpClient {
    /// Build a client with a fresh transport configured from `api`.
    pub fn new(api: &ApiConfig, tokens: Arc<dyn TokenStore>) -> Result<Self, ClientError> {
        let http = create_client_with_timeout(api.timeout())?;
        Ok(Self::with_transport(http, api, tokens))
    }

    /// Build a client around an existing transport.
    pub fn with_transport(http: Client, api: &ApiConfig, tokens: Arc<dyn TokenStore>) -> Self {
        Self {
            http,
            tokens,
            observer: Arc::new(TracingObserver),
            auth: Arc::new(AuthSettings {
                login_url: api.login_url(),
                login_route: api.login_route.clone(),
                public_endpoints: api.public_endpoints.clone(),
                policy: ReauthPolicy::new(api.max_reauth_retries),
            }),
            retry: Arc::new(Mutex::new(RetryCounter::default())),
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn SessionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn tokens(&self) -> &Arc<dyn TokenStore> {
        &self.tokens
    }

    /// Store a credential issued by a login response.
    pub fn set_access_token(&self, token: &str) -> Result<(), ClientError> {
        self.tokens.set_access_token(token)
    }

    /// Remove every session key from the token store.
    pub fn clear_session(&self) -> Result<(), ClientError> {
        self.tokens.clear_session()
    }

    /// Re-authentication attempts since the last success.
    pub async fn retry_count(&self) -> u32 {
        self.retry.lock().await.attempts
    }

    /// Wait for every background re-authentication started so far.
    pub async fn join_reauth(&self) {
        let handles: Vec<_> = self.pending.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "re-authentication task panicked");
            }
        }
    }

    pub async fn get(&self, url: &str, config: RequestConfig) -> Result<ResponseBody, ClientError> {
        self.request(Method::GET, url, None, config).await
    }

    pub async fn post(&self, url: &str, body: Option<&Value>, config: RequestConfig) -> Result<ResponseBody, ClientError> {
        self.request(Method::POST, url, body, config).await
    }

    pub async fn put(&self, url: &str, body: Option<&Value>, config: RequestConfig) -> Result<ResponseBody, ClientError> {
        self.request(Method::PUT, url, body, config).await
    }

    pub async fn patch(&self, url: &str, body: Option<&Value>, config: RequestConfig) -> Result<ResponseBody, ClientError> {
        self.request(Method::PATCH, url, body, config).await
    }

    pub async fn delete(&self, url: &str, config: RequestConfig) -> Result<ResponseBody, ClientError> {
        self.request(Method::DELETE, url, None, config).await
    }

    /// Run one request through the full interceptor chain.
    pub async fn request(
        &self,
        method: Method,
        url: &str,
        body: Option<&Value>,
        config: RequestConfig,
    ) -> Result<ResponseBody, ClientError> {
        let target = Url::parse(url).map_err(|e| ClientError::InvalidRequest(format!("{}: {}", url, e)))?;
        let span = tracing::debug_span!("request", request_id = %Uuid::new_v4(), %method, url);

        async move {
            let token = self.tokens.access_token();
            let raw = self.dispatch(method, target.clone(), body, &config, token.as_deref()).await?;
            tracing::debug!(status = raw.status, "response received");

            if raw.is_success() {
                Ok(unwrap_response(raw))
            } else {
                Err(self.handle_error(&target, raw, token.as_deref()).await)
            }
        }
        .instrument(span)
        .await
    }

    /// Request interceptor plus transport round-trip. No response handling.
    async fn dispatch(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
        config: &RequestConfig,
        token: Option<&str>,
    ) -> Result<RawResponse, ClientError> {
        let mut headers = build_headers(&config.headers)?;
        attach_bearer(&mut headers, token);

        let mut builder = self.http.request(method, url).headers(headers);
        if !config.params.is_empty() {
            builder = builder.query(&config.params);
        }
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = capture_headers(response.headers());
        let body = response.text().await?;

        Ok(RawResponse { status, headers, body })
    }

    /// Response error interceptor. `sent_token` is the credential the
    /// failing request carried.
    async fn handle_error(&self, url: &Url, raw: RawResponse, sent_token: Option<&str>) -> ClientError {
        match raw.status {
            401 if !self.is_public(url) => {
                self.schedule_reauth(url, sent_token).await;
                ClientError::Unauthenticated { url: url.to_string() }
            }
            403 => {
                self.observer.on_forbidden(url.as_str());
                ClientError::Forbidden { url: url.to_string() }
            }
            status => ClientError::Http { status, body: raw.body },
        }
    }

    /// Public endpoints match on the exact URL path (or the full URL). An
    /// entry ending in `*` matches any path with that prefix.
    fn is_public(&self, url: &Url) -> bool {
        self.auth.public_endpoints.iter().any(|endpoint| match endpoint.strip_suffix('*') {
            Some(prefix) => url.path().starts_with(prefix),
            None => url.path() == endpoint || url.as_str() == endpoint,
        })
    }

    async fn schedule_reauth(&self, url: &Url, sent_token: Option<&str>) {
        tracing::warn!(url = %url, "access token expired");

        {
            let mut counter = self.retry.lock().await;
            *counter = counter.begin_attempt();

            // A token stored after the failing request was sent is still good.
            if self.tokens.access_token().as_deref() == sent_token {
                if let Err(e) = self.tokens.remove_access_token() {
                    tracing::warn!(error = %e, "failed to remove expired token");
                }
            } else {
                tracing::debug!("stored token changed since the request was sent, keeping it");
            }
        }

        let client = self.clone();
        let handle = tokio::spawn(async move { client.reauthenticate().await });

        let mut pending = self.pending.lock().await;
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    async fn reauthenticate(&self) {
        let fetched = self.fetch_fresh_token().await;

        // Token store and counter change together, under the retry lock.
        let (decision, attempts) = {
            let mut counter = self.retry.lock().await;
            let outcome = match fetched {
                Ok(token) => match self.tokens.set_access_token(&token) {
                    Ok(()) => ReauthOutcome::Succeeded,
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to store refreshed token");
                        ReauthOutcome::Failed
                    }
                },
                Err(e) => {
                    tracing::warn!(error = %e, "re-authentication failed");
                    ReauthOutcome::Failed
                }
            };
            let (decision, next) = self.auth.policy.decide(*counter, outcome);
            *counter = next;
            (decision, next.attempts)
        };

        match decision {
            ReauthDecision::Recovered => tracing::info!("re-authenticated"),
            ReauthDecision::Retry => tracing::warn!(attempts, "re-authentication will be retried on the next 401"),
            ReauthDecision::Abandon => {
                tracing::warn!(attempts, "re-authentication abandoned, clearing session");
                if let Err(e) = self.tokens.clear_session() {
                    tracing::warn!(error = %e, "failed to clear session");
                }
                self.observer.on_session_expired(&self.auth.login_route);
            }
        }
    }

    /// GET the login endpoint. Never goes through the error interceptor, so
    /// a 401 here cannot start another re-authentication.
    async fn fetch_fresh_token(&self) -> Result<String, ClientError> {
        let url = Url::parse(&self.auth.login_url)
            .map_err(|e| ClientError::Config(format!("login url {}: {}", self.auth.login_url, e)))?;

        let token = self.tokens.access_token();
        let raw = self
            .dispatch(Method::GET, url, None, &RequestConfig::default(), token.as_deref())
            .await?;
        if !raw.is_success() {
            return Err(ClientError::Http { status: raw.status, body: raw.body });
        }

        match unwrap_response(raw) {
            ResponseBody::Json(value) => value
                .get("access_token")
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| ClientError::Decode("login response has no access_token".to_string())),
            ResponseBody::Raw(_) => Err(ClientError::Decode("login response is not JSON".to_string())),
        }
    }
}

/// Request interceptor: add a bearer header unless one was set explicitly.
pub fn attach_bearer(headers: &mut HeaderMap, token: Option<&str>) {
    let Some(token) = token.filter(|t| !t.is_empty()) else {
        return;
    };
    if headers.contains_key(AUTHORIZATION) {
        return;
    }
    if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", token)) {
        headers.insert(AUTHORIZATION, value);
    }
}

/// Response success interceptor.
pub fn unwrap_response(raw: RawResponse) -> ResponseBody {
    if !raw.content_type().map(is_json_content_type).unwrap_or(false) {
        return ResponseBody::Raw(raw);
    }
    if raw.body.trim().is_empty() {
        return ResponseBody::Raw(raw);
    }

    match serde_json::from_str(&raw.body) {
        Ok(value) => ResponseBody::Json(value),
        Err(e) => {
            tracing::debug!(error = %e, "JSON response did not parse, returning raw");
            ResponseBody::Raw(raw)
        }
    }
}

fn build_headers(pairs: &[(String, String)]) -> Result<HeaderMap, ClientError> {
    let mut headers = HeaderMap::new();
    for (name, value) in pairs {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| ClientError::InvalidRequest(format!("header {}: {}", name, e)))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| ClientError::InvalidRequest(format!("header {}: {}", name, e)))?;
        headers.append(name, value);
    }
    Ok(headers)
}

/// Response headers as owned pairs. Values that are not visible ASCII are
/// decoded lossily rather than dropped.
fn capture_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                String::from_utf8_lossy(value.as_bytes()).into_owned(),
            )
        })
        .collect()
}
