//! Request context
//!
//! [`Context`] is the request-scoped data handed to every bridged callback.
//! It is extracted by axum like any other extractor, so middleware can seed
//! it through the [`ContextValues`] request extension.

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, FromRequestParts, Query};
use dashmap::DashMap;
use http::request::Parts;
use http::{HeaderMap, Method, Uri};
use serde_json::Value;

/// Header used as request id when the client or a proxy supplied one
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Values that middleware attach to a request for the bridge to pick up
#[derive(Debug, Clone, Default)]
pub struct ContextValues(HashMap<String, Value>);

impl ContextValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

/// Request context shared with bridged callbacks. Cloning is cheap.
#[derive(Debug, Clone, Default)]
pub struct Context {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    request_id: String,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    remote_addr: Option<SocketAddr>,
    values: DashMap<String, Value>,
}

impl Context {
    /// Build a context from request parts
    pub fn from_parts(parts: &Parts) -> Self {
        let request_id = parts
            .headers
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let values = DashMap::new();
        if let Some(seeded) = parts.extensions.get::<ContextValues>() {
            for (key, value) in &seeded.0 {
                values.insert(key.clone(), value.clone());
            }
        }

        Self {
            inner: Arc::new(Inner {
                request_id,
                method: parts.method.clone(),
                uri: parts.uri.clone(),
                headers: parts.headers.clone(),
                remote_addr: parts
                    .extensions
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|info| info.0),
                values,
            }),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.inner.request_id
    }

    pub fn method(&self) -> &Method {
        &self.inner.method
    }

    pub fn uri(&self) -> &Uri {
        &self.inner.uri
    }

    pub fn path(&self) -> &str {
        self.inner.uri.path()
    }

    /// One query parameter, percent-decoded
    pub fn query(&self, name: &str) -> Option<String> {
        Query::<HashMap<String, String>>::try_from_uri(&self.inner.uri)
            .ok()
            .and_then(|Query(mut params)| params.remove(name))
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.inner.headers
    }

    /// One request header as text
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.inner.remote_addr
    }

    /// Read a request-scoped value
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.values.get(key).map(|v| v.clone())
    }

    /// Store a request-scoped value, visible to every clone of this context
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        self.inner.values.insert(key.into(), value.into());
    }
}

impl<S> FromRequestParts<S> for Context
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts))
    }
}
