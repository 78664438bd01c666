//! Cache-aware query and mutation handles over a [`ResourceService`].
//!
//! Queries are keyed by `(url, params)` only, where params are the query
//! params actually sent. Body, headers and timeout do not participate, so
//! two reads that differ only in those share one cache entry. Mutations
//! never touch the cache except to invalidate the prefixes the caller asked
//! for.

#[cfg(test)]
mod tests;

use crate::client::ResponseBody;
use crate::config::CacheConfig;
use crate::error::ClientError;
use crate::resource::{RequestDescriptor, ResourceService};
use moka::future::Cache;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Identity of a cached read.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
    pub url: String,
    pub params: Vec<(String, String)>,
}

/// Shared query cache. Clones refer to the same entries.
#[derive(Clone)]
pub struct QueryCache {
    inner: Cache<QueryKey, Arc<ResponseBody>>,
}

impl QueryCache {
    pub fn new(config: &CacheConfig) -> Self {
        let inner = Cache::builder()
            .max_capacity(config.max_capacity)
            .time_to_live(Duration::from_secs(config.ttl_secs))
            .build();
        Self { inner }
    }

    pub async fn get(&self, key: &QueryKey) -> Option<Arc<ResponseBody>> {
        self.inner.get(key).await
    }

    pub async fn invalidate(&self, key: &QueryKey) {
        self.inner.invalidate(key).await;
    }

    /// Drop every entry whose URL starts with `prefix`. Returns how many
    /// entries were dropped.
    pub async fn invalidate_prefix(&self, prefix: &str) -> usize {
        let matching: Vec<Arc<QueryKey>> = self
            .inner
            .iter()
            .filter(|(key, _)| key.url.starts_with(prefix))
            .map(|(key, _)| key)
            .collect();

        for key in &matching {
            self.inner.invalidate(&**key).await;
        }
        tracing::debug!(prefix, dropped = matching.len(), "invalidated cached queries");
        matching.len()
    }

    pub fn clear(&self) {
        self.inner.invalidate_all();
    }

    pub async fn entry_count(&self) -> u64 {
        self.inner.run_pending_tasks().await;
        self.inner.entry_count()
    }

    /// Cached value for `key`, or the result of `fetch`. Concurrent callers
    /// for the same key share one fetch. Errors are not cached.
    async fn get_or_fetch<F>(&self, key: QueryKey, fetch: F) -> Result<Arc<ResponseBody>, ClientError>
    where
        F: Future<Output = Result<ResponseBody, ClientError>>,
    {
        self.inner
            .try_get_with(key, async move { fetch.await.map(Arc::new) })
            .await
            .map_err(|e| (*e).clone())
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

pub type SuccessCallback = Arc<dyn Fn(&ResponseBody) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&ClientError) + Send + Sync>;
pub type SettledCallback = Arc<dyn Fn(Result<&ResponseBody, &ClientError>) + Send + Sync>;

#[derive(Clone, Default)]
struct Callbacks {
    on_success: Option<SuccessCallback>,
    on_error: Option<ErrorCallback>,
    on_settled: Option<SettledCallback>,
}

impl Callbacks {
    fn notify(&self, result: Result<&ResponseBody, &ClientError>) {
        match result {
            Ok(body) => {
                if let Some(cb) = &self.on_success {
                    cb(body);
                }
            }
            Err(err) => {
                if let Some(cb) = &self.on_error {
                    cb(err);
                }
            }
        }
        if let Some(cb) = &self.on_settled {
            cb(result);
        }
    }
}

/// Caller options for a query.
#[derive(Clone, Default)]
pub struct QueryOptions {
    callbacks: Callbacks,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_success(mut self, f: impl Fn(&ResponseBody) + Send + Sync + 'static) -> Self {
        self.callbacks.on_success = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&ClientError) + Send + Sync + 'static) -> Self {
        self.callbacks.on_error = Some(Arc::new(f));
        self
    }

    pub fn on_settled(mut self, f: impl Fn(Result<&ResponseBody, &ClientError>) + Send + Sync + 'static) -> Self {
        self.callbacks.on_settled = Some(Arc::new(f));
        self
    }
}

/// Caller options for a mutation.
#[derive(Clone, Default)]
pub struct MutationOptions {
    callbacks: Callbacks,
    invalidates: Vec<String>,
}

impl MutationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_success(mut self, f: impl Fn(&ResponseBody) + Send + Sync + 'static) -> Self {
        self.callbacks.on_success = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&ClientError) + Send + Sync + 'static) -> Self {
        self.callbacks.on_error = Some(Arc::new(f));
        self
    }

    pub fn on_settled(mut self, f: impl Fn(Result<&ResponseBody, &ClientError>) + Send + Sync + 'static) -> Self {
        self.callbacks.on_settled = Some(Arc::new(f));
        self
    }

    /// Invalidate cached queries under `path` after a successful mutation.
    /// Absolute URLs are used as-is; anything else is relative to the
    /// service endpoint.
    pub fn invalidates(mut self, path: &str) -> Self {
        self.invalidates.push(path.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueryMethod {
    Get,
    Post,
}

/// A cache-integrated read.
#[derive(Clone)]
pub struct Query {
    service: ResourceService,
    descriptor: RequestDescriptor,
    method: QueryMethod,
    key: QueryKey,
    cache: QueryCache,
    options: QueryOptions,
}

impl Query {
    pub fn key(&self) -> &QueryKey {
        &self.key
    }

    /// Cached result, or a network call on miss.
    pub async fn fetch(&self) -> Result<Arc<ResponseBody>, ClientError> {
        let result = self.cache.get_or_fetch(self.key.clone(), self.run()).await;
        self.options.callbacks.notify(result.as_ref().map(|body| &**body));
        result
    }

    /// Drop the cached entry and fetch again.
    pub async fn refetch(&self) -> Result<Arc<ResponseBody>, ClientError> {
        self.invalidate().await;
        self.fetch().await
    }

    pub async fn invalidate(&self) {
        self.cache.invalidate(&self.key).await;
    }

    async fn run(&self) -> Result<ResponseBody, ClientError> {
        match self.method {
            QueryMethod::Get => self.service.get(&self.descriptor).await,
            QueryMethod::Post => self.service.post(&self.descriptor).await,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MutationMethod {
    Post,
    Put,
    Patch,
    Delete,
}

/// A write bound to a pre-built descriptor.
#[derive(Clone)]
pub struct Mutation {
    service: ResourceService,
    descriptor: RequestDescriptor,
    method: MutationMethod,
    cache: QueryCache,
    options: MutationOptions,
}

impl Mutation {
    /// Send `data` as the body of the pre-bound request. Delete mutations
    /// ignore `data` and send only the bound id and params.
    pub async fn mutate(&self, data: Option<Value>) -> Result<ResponseBody, ClientError> {
        let result = match self.method {
            MutationMethod::Post => self.service.post(&self.descriptor.with_body(data)).await,
            MutationMethod::Put => self.service.put(&self.descriptor.with_body(data)).await,
            MutationMethod::Patch => self.service.patch(&self.descriptor.with_body(data)).await,
            MutationMethod::Delete => self.service.delete(&self.descriptor.with_body(None)).await,
        };

        if result.is_ok() {
            for path in &self.options.invalidates {
                self.cache.invalidate_prefix(&self.resolve_path(path)).await;
            }
        }
        self.options.callbacks.notify(result.as_ref());
        result
    }

    fn resolve_path(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.service.endpoint(), path)
        }
    }
}

/// Query and mutation factory for one service.
#[derive(Clone)]
pub struct ResourceApi {
    service: ResourceService,
    cache: QueryCache,
}

impl ResourceApi {
    pub fn new(service: ResourceService, cache: QueryCache) -> Self {
        Self { service, cache }
    }

    pub fn service(&self) -> &ResourceService {
        &self.service
    }

    pub fn cache(&self) -> &QueryCache {
        &self.cache
    }

    pub fn query_key(&self, descriptor: &RequestDescriptor) -> QueryKey {
        QueryKey {
            url: self.service.target_url(descriptor),
            params: descriptor.query_params().to_vec(),
        }
    }

    pub fn get_query(&self, descriptor: RequestDescriptor, options: QueryOptions) -> Query {
        self.query(descriptor, QueryMethod::Get, options)
    }

    /// A POST used as a read, cached like a GET.
    pub fn post_query(&self, descriptor: RequestDescriptor, options: QueryOptions) -> Query {
        self.query(descriptor, QueryMethod::Post, options)
    }

    pub fn post_mutation(&self, descriptor: RequestDescriptor, options: MutationOptions) -> Mutation {
        self.mutation(descriptor, MutationMethod::Post, options)
    }

    pub fn put_mutation(&self, descriptor: RequestDescriptor, options: MutationOptions) -> Mutation {
        self.mutation(descriptor, MutationMethod::Put, options)
    }

    pub fn patch_mutation(&self, descriptor: RequestDescriptor, options: MutationOptions) -> Mutation {
        self.mutation(descriptor, MutationMethod::Patch, options)
    }

    pub fn delete_mutation(&self, descriptor: RequestDescriptor, options: MutationOptions) -> Mutation {
        self.mutation(descriptor, MutationMethod::Delete, options)
    }

    fn query(&self, descriptor: RequestDescriptor, method: QueryMethod, options: QueryOptions) -> Query {
        Query {
            key: self.query_key(&descriptor),
            service: self.service.clone(),
            descriptor,
            method,
            cache: self.cache.clone(),
            options,
        }
    }

    fn mutation(&self, descriptor: RequestDescriptor, method: MutationMethod, options: MutationOptions) -> Mutation {
        Mutation {
            service: self.service.clone(),
            descriptor,
            method,
            cache: self.cache.clone(),
            options,
        }
    }
}
