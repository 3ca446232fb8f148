//! In-memory upstream storage service.
//!
//! A self-contained stand-in for the real storage service, holding
//! accounts, containers and objects in `tokio::sync::RwLock<HashMap<...>>`
//! maps.  It implements the slice of the service contract the gateway
//! relies on: metadata persistence with `X-*-Meta-` / `X-Remove-*-Meta-`
//! merge semantics, the native delayed-expiry directive (`X-Delete-At` /
//! `X-Delete-After`), and the "containers must be empty before DELETE"
//! rule.  Expiry is applied lazily: an entry whose deadline has passed is
//! purged the next time it is touched, which is indistinguishable from a
//! background expirer through the HTTP surface.
//!
//! Used as the `memory` upstream backend for development, and throughout
//! the test suite.

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::headers::{
    self, header_str, meta_key, ACCOUNT_META_PREFIX, ACCOUNT_REMOVE_META_PREFIX,
    OBJECT_META_PREFIX, OBJECT_REMOVE_META_PREFIX,
};
use crate::path::{classify, ResourcePath};

use super::store::{ProxiedRequest, ResourceInfo, UpstreamResponse, UpstreamStore};

/// Current time in epoch seconds.
fn epoch_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[derive(Debug, Default)]
struct AccountEntry {
    meta: HashMap<String, String>,
    containers: HashMap<String, ContainerEntry>,
}

#[derive(Debug, Default)]
struct ContainerEntry {
    meta: HashMap<String, String>,
    objects: HashMap<String, ObjectEntry>,
}

#[derive(Debug)]
struct ObjectEntry {
    data: Bytes,
    content_type: String,
    meta: HashMap<String, String>,
    /// Epoch seconds at which the service hard-deletes the object.
    delete_at: Option<u64>,
}

/// In-memory upstream service.
///
/// Account namespaces auto-create on first touch, as the real service does.
#[derive(Default)]
pub struct MemoryUpstream {
    accounts: tokio::sync::RwLock<HashMap<String, AccountEntry>>,
}

impl MemoryUpstream {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle one request against the store, service-side semantics only.
    pub async fn handle(&self, req: ProxiedRequest) -> UpstreamResponse {
        match classify(&req.path) {
            Some(ResourcePath::Account { account, .. }) => self.handle_account(&account, &req).await,
            Some(ResourcePath::Container {
                account, container, ..
            }) => self.handle_container(&account, &container, &req).await,
            Some(ResourcePath::Object {
                account,
                container,
                object,
                ..
            }) => self.handle_object(&account, &container, &object, &req).await,
            None => text(StatusCode::NOT_FOUND, "Not Found"),
        }
    }

    // -- Account requests -----------------------------------------------------

    async fn handle_account(&self, account: &str, req: &ProxiedRequest) -> UpstreamResponse {
        match req.method {
            Method::GET | Method::HEAD => {
                let accounts = self.accounts.read().await;
                let meta = accounts
                    .get(account)
                    .map(|e| e.meta.clone())
                    .unwrap_or_default();
                with_meta_headers(StatusCode::NO_CONTENT, &meta, ACCOUNT_META_PREFIX)
            }
            Method::POST => {
                let mut accounts = self.accounts.write().await;
                let entry = accounts.entry(account.to_string()).or_default();
                apply_meta(
                    &mut entry.meta,
                    &req.headers,
                    ACCOUNT_META_PREFIX,
                    ACCOUNT_REMOVE_META_PREFIX,
                );
                text(StatusCode::NO_CONTENT, "")
            }
            Method::DELETE => {
                self.accounts.write().await.remove(account);
                text(StatusCode::NO_CONTENT, "")
            }
            _ => text(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed"),
        }
    }

    // -- Container requests ---------------------------------------------------

    async fn handle_container(
        &self,
        account: &str,
        container: &str,
        req: &ProxiedRequest,
    ) -> UpstreamResponse {
        match req.method {
            Method::PUT => {
                let mut accounts = self.accounts.write().await;
                let entry = accounts.entry(account.to_string()).or_default();
                if entry.containers.contains_key(container) {
                    text(StatusCode::ACCEPTED, "")
                } else {
                    entry
                        .containers
                        .insert(container.to_string(), ContainerEntry::default());
                    text(StatusCode::CREATED, "")
                }
            }
            Method::GET | Method::HEAD => {
                let accounts = self.accounts.read().await;
                match accounts.get(account).and_then(|a| a.containers.get(container)) {
                    Some(c) => with_meta_headers(StatusCode::NO_CONTENT, &c.meta, "x-container-meta-"),
                    None => text(StatusCode::NOT_FOUND, "Not Found"),
                }
            }
            Method::POST => {
                let mut accounts = self.accounts.write().await;
                match accounts
                    .get_mut(account)
                    .and_then(|a| a.containers.get_mut(container))
                {
                    Some(c) => {
                        apply_meta(
                            &mut c.meta,
                            &req.headers,
                            "x-container-meta-",
                            "x-remove-container-meta-",
                        );
                        text(StatusCode::NO_CONTENT, "")
                    }
                    None => text(StatusCode::NOT_FOUND, "Not Found"),
                }
            }
            Method::DELETE => {
                let now = epoch_now();
                let mut accounts = self.accounts.write().await;
                let Some(a) = accounts.get_mut(account) else {
                    return text(StatusCode::NOT_FOUND, "Not Found");
                };
                let Some(c) = a.containers.get_mut(container) else {
                    return text(StatusCode::NOT_FOUND, "Not Found");
                };
                c.objects.retain(|_, o| !expired(o, now));
                if c.objects.is_empty() {
                    a.containers.remove(container);
                    text(StatusCode::NO_CONTENT, "")
                } else {
                    text(
                        StatusCode::CONFLICT,
                        "There was a conflict when trying to complete your request.",
                    )
                }
            }
            _ => text(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed"),
        }
    }

    // -- Object requests ------------------------------------------------------

    async fn handle_object(
        &self,
        account: &str,
        container: &str,
        object: &str,
        req: &ProxiedRequest,
    ) -> UpstreamResponse {
        let now = epoch_now();
        match req.method {
            Method::PUT => {
                let mut accounts = self.accounts.write().await;
                let Some(c) = accounts
                    .get_mut(account)
                    .and_then(|a| a.containers.get_mut(container))
                else {
                    return text(StatusCode::NOT_FOUND, "Not Found");
                };
                let mut entry = ObjectEntry {
                    data: req.body.clone(),
                    content_type: header_str(&req.headers, "content-type")
                        .unwrap_or("application/octet-stream")
                        .to_string(),
                    meta: HashMap::new(),
                    delete_at: None,
                };
                apply_meta(
                    &mut entry.meta,
                    &req.headers,
                    OBJECT_META_PREFIX,
                    OBJECT_REMOVE_META_PREFIX,
                );
                apply_expiry(&mut entry.delete_at, &req.headers, now);
                c.objects.insert(object.to_string(), entry);
                text(StatusCode::CREATED, "")
            }
            Method::GET | Method::HEAD => {
                let mut accounts = self.accounts.write().await;
                match live_object(&mut accounts, account, container, object, now) {
                    Some(o) => {
                        let mut resp =
                            with_meta_headers(StatusCode::OK, &o.meta, OBJECT_META_PREFIX);
                        if let Ok(ct) = HeaderValue::from_str(&o.content_type) {
                            resp.headers.insert("content-type", ct);
                        }
                        if let Some(at) = o.delete_at {
                            resp.headers.insert(
                                headers::DELETE_AT,
                                HeaderValue::from_str(&at.to_string()).unwrap(),
                            );
                        }
                        if req.method == Method::GET {
                            resp.body = o.data.clone();
                        }
                        resp
                    }
                    None => text(StatusCode::NOT_FOUND, "Not Found"),
                }
            }
            Method::POST => {
                let mut accounts = self.accounts.write().await;
                match live_object(&mut accounts, account, container, object, now) {
                    Some(o) => {
                        apply_meta(
                            &mut o.meta,
                            &req.headers,
                            OBJECT_META_PREFIX,
                            OBJECT_REMOVE_META_PREFIX,
                        );
                        apply_expiry(&mut o.delete_at, &req.headers, now);
                        text(StatusCode::ACCEPTED, "")
                    }
                    None => text(StatusCode::NOT_FOUND, "Not Found"),
                }
            }
            Method::DELETE => {
                let mut accounts = self.accounts.write().await;
                let Some(c) = accounts
                    .get_mut(account)
                    .and_then(|a| a.containers.get_mut(container))
                else {
                    return text(StatusCode::NOT_FOUND, "Not Found");
                };
                // Deleting an already-expired entry still purges it, but the
                // caller sees the same 404 the expiry primitive would give.
                match c.objects.remove(object) {
                    Some(o) if !expired(&o, now) => text(StatusCode::NO_CONTENT, ""),
                    _ => text(StatusCode::NOT_FOUND, "Not Found"),
                }
            }
            _ => text(StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed"),
        }
    }
}

// -- Shared helpers -----------------------------------------------------------

fn expired(o: &ObjectEntry, now: u64) -> bool {
    o.delete_at.is_some_and(|at| at <= now)
}

/// Look up an object, purging it first if its expiry deadline has passed.
fn live_object<'a>(
    accounts: &'a mut HashMap<String, AccountEntry>,
    account: &str,
    container: &str,
    object: &str,
    now: u64,
) -> Option<&'a mut ObjectEntry> {
    let c = accounts.get_mut(account)?.containers.get_mut(container)?;
    if c.objects.get(object).is_some_and(|o| expired(o, now)) {
        c.objects.remove(object);
        return None;
    }
    c.objects.get_mut(object)
}

/// Merge metadata headers into a metadata map: `X-<kind>-Meta-*` sets an
/// entry, `X-Remove-<kind>-Meta-*` deletes it.
fn apply_meta(
    meta: &mut HashMap<String, String>,
    headers: &HeaderMap,
    set_prefix: &str,
    remove_prefix: &str,
) {
    for (name, value) in headers {
        let name = name.as_str();
        if let Some(key) = meta_key(name, remove_prefix) {
            meta.remove(key);
        } else if let Some(key) = meta_key(name, set_prefix) {
            if let Ok(v) = value.to_str() {
                meta.insert(key.to_string(), v.trim().to_string());
            }
        }
    }
}

/// Apply the delayed-expiry directive headers to an object's deadline.
fn apply_expiry(delete_at: &mut Option<u64>, headers: &HeaderMap, now: u64) {
    if headers.contains_key(headers::REMOVE_DELETE_AT)
        || headers.contains_key(headers::REMOVE_DELETE_AFTER)
    {
        *delete_at = None;
    }
    if let Some(secs) = header_str(headers, headers::DELETE_AFTER).and_then(|v| v.parse::<u64>().ok()) {
        *delete_at = Some(now + secs);
    }
    if let Some(at) = header_str(headers, headers::DELETE_AT).and_then(|v| v.parse().ok()) {
        *delete_at = Some(at);
    }
}

fn text(status: StatusCode, msg: &str) -> UpstreamResponse {
    let mut headers = HeaderMap::new();
    let body = if msg.is_empty() {
        Bytes::new()
    } else {
        headers.insert("content-type", HeaderValue::from_static("text/plain"));
        Bytes::from(format!("{msg}\n"))
    };
    UpstreamResponse {
        status,
        headers,
        body,
    }
}

fn with_meta_headers(
    status: StatusCode,
    meta: &HashMap<String, String>,
    prefix: &str,
) -> UpstreamResponse {
    let mut headers = HeaderMap::new();
    for (key, value) in meta {
        let name = format!("{prefix}{key}");
        if let (Ok(name), Ok(value)) = (
            http::HeaderName::try_from(name),
            HeaderValue::from_str(value),
        ) {
            headers.insert(name, value);
        }
    }
    UpstreamResponse {
        status,
        headers,
        body: Bytes::new(),
    }
}

// -- UpstreamStore impl -------------------------------------------------------

impl UpstreamStore for MemoryUpstream {
    fn account_info<'a>(
        &'a self,
        _version: &'a str,
        account: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<ResourceInfo>>> + Send + 'a>> {
        Box::pin(async move {
            let accounts = self.accounts.read().await;
            // Account namespaces auto-create, so metadata always resolves.
            let meta = accounts
                .get(account)
                .map(|e| e.meta.clone())
                .unwrap_or_default();
            Ok(Some(ResourceInfo { meta }))
        })
    }

    fn object_info<'a>(
        &'a self,
        _version: &'a str,
        account: &'a str,
        container: &'a str,
        object: &'a str,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<ResourceInfo>>> + Send + 'a>> {
        Box::pin(async move {
            let now = epoch_now();
            let mut accounts = self.accounts.write().await;
            Ok(live_object(&mut accounts, account, container, object, now)
                .map(|o| ResourceInfo { meta: o.meta.clone() }))
        })
    }

    fn forward(
        &self,
        req: ProxiedRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<UpstreamResponse>> + Send + '_>> {
        Box::pin(async move { Ok(self.handle(req).await) })
    }
}

// -- Tests --------------------------------------------------------------------
