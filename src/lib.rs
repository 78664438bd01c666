//! apiwire - authenticated HTTP client with cache-aware resource queries.
//!
//! Features:
//! - Bearer token injection from a persistent token store
//! - JSON response unwrapping
//! - Bounded background re-authentication on 401, session teardown on exhaustion
//! - Per-service CRUD operations and cached query/mutation handles

pub mod auth;
pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod hooks;
pub mod http;
pub mod resource;
pub mod session;
pub mod token_store;

pub use client::{HttpClient, RawResponse, RequestConfig, ResponseBody};
pub use config::Config;
pub use endpoint::EndpointResolver;
pub use error::{ClientError, ConfigError};
pub use hooks::{Mutation, MutationOptions, Query, QueryCache, QueryKey, QueryOptions, ResourceApi};
pub use resource::{RequestDescriptor, ResourceService};
pub use session::{SessionObserver, TracingObserver};
pub use token_store::{FileTokenStore, MemoryTokenStore, TokenStore};
