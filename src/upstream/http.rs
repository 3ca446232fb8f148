//! HTTP upstream: proxies requests to the real storage service.
//!
//! Uses `reqwest` against the service's base endpoint.  Metadata lookups
//! are HEAD requests on the resource path; forwarding replays the original
//! method, path, query, headers and body, with hop-by-hop headers stripped
//! in both directions.

use http::{HeaderMap, StatusCode};
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;

use crate::config::HttpUpstreamConfig;
use crate::headers::{meta_key, ACCOUNT_META_PREFIX, OBJECT_META_PREFIX};

use super::store::{ProxiedRequest, ResourceInfo, UpstreamResponse, UpstreamStore};

/// Characters escaped when rebuilding a path segment for an info lookup.
/// `/` is deliberately not escaped: object names contain real slashes.
const SEGMENT_ENCODE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'%')
    .add(b'{')
    .add(b'}')
    .add(b'|')
    .add(b'\\')
    .add(b'^')
    .add(b'`');

/// Hop-by-hop headers that must not cross the proxy boundary.
/// `content-length` is recomputed on each side from the actual body.
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "host",
    "content-length",
];

/// Upstream implementation backed by a real storage service over HTTP.
pub struct HttpUpstream {
    client: reqwest::Client,
    /// Base URL without a trailing slash.
    endpoint: String,
}

impl HttpUpstream {
    /// Build a client for the configured endpoint.
    pub fn new(config: &HttpUpstreamConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        })
    }

    /// Rebuild a resource URL from decoded path segments.
    fn resource_url(&self, segments: &[&str]) -> String {
        let mut url = self.endpoint.clone();
        for segment in segments {
            url.push('/');
            url.push_str(&utf8_percent_encode(segment, SEGMENT_ENCODE).to_string());
        }
        url
    }

    /// HEAD a resource and extract its metadata map.
    async fn head_info(
        &self,
        url: &str,
        meta_prefix: &str,
    ) -> anyhow::Result<Option<ResourceInfo>> {
        let response = self.client.head(url).send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            anyhow::bail!("metadata HEAD {} returned {}", url, status);
        }

        Ok(Some(ResourceInfo {
            meta: meta_from_headers(response.headers(), meta_prefix),
        }))
    }
}

/// Extract `X-*-Meta-*` headers into a stripped-key metadata map.
fn meta_from_headers(headers: &HeaderMap, prefix: &str) -> HashMap<String, String> {
    let mut meta = HashMap::new();
    for (name, value) in headers {
        if let Some(key) = meta_key(name.as_str(), prefix) {
            if let Ok(v) = value.to_str() {
                meta.insert(key.to_string(), v.trim().to_string());
            }
        }
    }
    meta
}

/// Remove headers that must not be relayed across the proxy.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}

impl UpstreamStore for HttpUpstream {
    fn account_info<'a>(
        &'a self,
        version: &'a str,
        account: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<ResourceInfo>>> + Send + 'a>> {
        Box::pin(async move {
            let url = self.resource_url(&[version, account]);
            self.head_info(&url, ACCOUNT_META_PREFIX).await
        })
    }

    fn object_info<'a>(
        &'a self,
        version: &'a str,
        account: &'a str,
        container: &'a str,
        object: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<ResourceInfo>>> + Send + 'a>> {
        Box::pin(async move {
            let url = self.resource_url(&[version, account, container, object]);
            self.head_info(&url, OBJECT_META_PREFIX).await
        })
    }

    fn forward(
        &self,
        req: ProxiedRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<UpstreamResponse>> + Send + '_>> {
        Box::pin(async move {
            let mut url = format!("{}{}", self.endpoint, req.path);
            if let Some(query) = &req.query {
                url.push('?');
                url.push_str(query);
            }

            let mut headers = req.headers;
            strip_hop_by_hop(&mut headers);

            debug!("forwarding {} {}", req.method, url);
            let response = self
                .client
                .request(req.method, &url)
                .headers(headers)
                .body(req.body)
                .send()
                .await?;

            let status = response.status();
            let mut headers = response.headers().clone();
            strip_hop_by_hop(&mut headers);
            let body = response.bytes().await?;

            Ok(UpstreamResponse {
                status,
                headers,
                body,
            })
        })
    }
}

// -- Tests --------------------------------------------------------------------
