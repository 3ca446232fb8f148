//! Abstract upstream storage service contract.
//!
//! The gateway needs exactly three capabilities from the service it fronts:
//! read the metadata of an account, read the metadata of an object, and
//! forward a (possibly header-rewritten) request wholesale.  Everything the
//! recycle mechanism persists lives as metadata on the upstream side; the
//! gateway holds no durable state of its own.

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

/// Metadata snapshot of an account or object resource.
///
/// Keys are lowercase with the `X-Account-Meta-` / `X-Object-Meta-` wire
/// prefix stripped, mirroring how the service itself exposes metadata.
#[derive(Debug, Clone, Default)]
pub struct ResourceInfo {
    /// Metadata entries, e.g. `recycled` -> `yes`.
    pub meta: HashMap<String, String>,
}

/// A request captured for forwarding upstream.
///
/// `path` and `query` are kept exactly as received so a forwarded request
/// reaches the service byte-for-byte, apart from deliberate header rewrites.
#[derive(Debug, Clone)]
pub struct ProxiedRequest {
    pub method: Method,
    /// Original, still-encoded request path.
    pub path: String,
    /// Raw query string, without the leading `?`.
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

/// A response relayed from the upstream service.
#[derive(Debug)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl axum::response::IntoResponse for UpstreamResponse {
    fn into_response(self) -> axum::response::Response {
        let mut response = axum::response::Response::new(axum::body::Body::from(self.body));
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        response
    }
}

/// Async upstream storage contract.
pub trait UpstreamStore: Send + Sync + 'static {
    /// Fetch account metadata.  `Ok(None)` means the service reports no
    /// such account; errors are transport-level failures.
    fn account_info<'a>(
        &'a self,
        version: &'a str,
        account: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<ResourceInfo>>> + Send + 'a>>;

    /// Fetch object metadata.  `Ok(None)` means the object does not exist
    /// (including objects already removed by the expiry primitive).
    fn object_info<'a>(
        &'a self,
        version: &'a str,
        account: &'a str,
        container: &'a str,
        object: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<ResourceInfo>>> + Send + 'a>>;

    /// Forward a request to the service and relay its response unmodified.
    fn forward(
        &self,
        req: ProxiedRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<UpstreamResponse>> + Send + '_>>;
}
