//! Axum router construction and request dispatch.
//!
//! The gateway has only two routes of its own (`/health`, `/metrics`);
//! everything else lands in the fallback, is classified by [`crate::path`],
//! and is either answered by a guard or forwarded to the upstream storage
//! service unmodified.

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, State},
    http::{HeaderValue, Method, Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::errors::{generate_trans_id, GateError};
use crate::guards;
use crate::headers::TRANS_ID;
use crate::metrics::{metrics_handler, metrics_middleware};
use crate::path::{classify, ResourcePath};
use crate::upstream::store::ProxiedRequest;
use crate::AppState;

/// Build the axum [`Router`] for the gateway.
///
/// The returned router is ready to be passed to `axum::serve`.
pub fn app(state: Arc<AppState>) -> Router {
    let mut router: Router<Arc<AppState>> = Router::new();

    if state.config.observability.health_check {
        router = router.route("/health", get(health_check));
    }
    if state.config.observability.metrics {
        router = router.route("/metrics", get(metrics_handler));
    }

    router
        // Everything else is storage traffic.
        .fallback(dispatch)
        .with_state(state)
        // Layer ordering: inner layers run first, outer layers wrap them.
        .layer(middleware::from_fn(common_headers_middleware))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        // Forwarded uploads can be large.
        .layer(DefaultBodyLimit::disable())
}

// -- Common headers middleware -----------------------------------------------

/// Middleware that adds common response headers to every response:
/// - `X-Trans-Id`: Swift-style transaction ID
/// - `Date`: RFC 7231 formatted timestamp
/// - `Server`: `RecycleGate`
async fn common_headers_middleware(req: Request<Body>, next: Next) -> Response {
    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    // Keep an upstream transaction ID if the service already set one.
    if !headers.contains_key(TRANS_ID) {
        let trans_id = generate_trans_id();
        headers.insert(TRANS_ID, HeaderValue::from_str(&trans_id).unwrap());
    }

    let date = httpdate::fmt_http_date(std::time::SystemTime::now());
    headers.insert("date", HeaderValue::from_str(&date).unwrap());
    headers.insert("server", HeaderValue::from_static("RecycleGate"));

    response
}

// -- Health check ------------------------------------------------------------

/// `GET /health` -- Returns `{"status": "ok"}` with 200 OK.
async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "application/json")],
        serde_json::json!({"status": "ok"}).to_string(),
    )
}

// -- Dispatch ----------------------------------------------------------------

/// Classify the request and hand it to the matching guard, or pass it
/// through untouched when no recycle logic applies.
async fn dispatch(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
) -> Result<Response, GateError> {
    let (parts, body) = req.into_parts();
    let body = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|err| anyhow::anyhow!("failed to read request body: {err}"))?;

    let proxied = ProxiedRequest {
        method: parts.method,
        path: parts.uri.path().to_string(),
        query: parts.uri.query().map(str::to_string),
        headers: parts.headers,
        body,
    };

    let Some(resource) = classify(&proxied.path) else {
        // Not a storage path; relay verbatim.
        let response = state.upstream.forward(proxied).await?;
        return Ok(response.into_response());
    };

    // A recycled account masks every read under it, at any depth.
    if proxied.method == Method::GET || proxied.method == Method::HEAD {
        if let Some(masked) =
            guards::account::mask_recycled(&state, resource.version(), resource.account()).await
        {
            return Ok(masked);
        }
    }

    match &resource {
        ResourcePath::Account { version, account } => {
            guards::account::intercept(&state, version, account, proxied).await
        }
        // Containers have no recycle logic of their own: the service's
        // "must be empty before DELETE" rule is their protection.
        ResourcePath::Container { .. } => {
            let response = state.upstream.forward(proxied).await?;
            Ok(response.into_response())
        }
        ResourcePath::Object {
            version,
            account,
            container,
            object,
        } => {
            guards::object::intercept(&state, version, account, container, object, proxied).await
        }
    }
}

// -- Tests --------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::guards::epoch_now;
    use crate::upstream::memory::MemoryUpstream;
    use crate::upstream::store::UpstreamStore;
    use bytes::Bytes;
    use http::HeaderName;
    use tower::util::ServiceExt;

    fn test_state(
        account_recycled_seconds: u64,
        object_recycled_seconds: u64,
    ) -> (Router, Arc<MemoryUpstream>) {
        let upstream = Arc::new(MemoryUpstream::new());
        let mut config = Config::default();
        config.recycle.account_recycled_seconds = account_recycled_seconds;
        config.recycle.object_recycled_seconds = object_recycled_seconds;
        // Tests do not install the global Prometheus recorder.
        config.observability.metrics = false;
        let state = Arc::new(AppState {
            config,
            upstream: upstream.clone(),
        });
        (app(state), upstream)
    }

    async fn send(
        router: &Router,
        method: Method,
        path: &str,
        hdrs: &[(&str, &str)],
        body: &str,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(path);
        for (name, value) in hdrs {
            builder = builder.header(*name, *value);
        }
        let request = builder.body(Body::from(body.to_string())).unwrap();
        router.clone().oneshot(request).await.unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Direct service-side request, bypassing the gateway (e.g. to seed
    /// state the gateway itself refuses to write).
    async fn upstream_post(upstream: &MemoryUpstream, path: &str, hdrs: &[(&str, &str)]) {
        let mut headers = http::HeaderMap::new();
        for (name, value) in hdrs {
            headers.insert(
                HeaderName::try_from(*name).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        let resp = upstream
            .handle(ProxiedRequest {
                method: Method::POST,
                path: path.to_string(),
                query: None,
                headers,
                body: Bytes::new(),
            })
            .await;
        assert!(resp.status.is_success(), "seed POST failed: {}", resp.status);
    }

    async fn put_object(router: &Router, path: &str, body: &str) {
        let container = path.rsplitn(2, '/').nth(1).unwrap().to_string();
        let resp = send(router, Method::PUT, &container, &[], "").await;
        assert!(resp.status().is_success());
        let resp = send(router, Method::PUT, path, &[], body).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    // -- Account flow ---------------------------------------------------------

    #[tokio::test]
    async fn test_mark_account_masks_reads() {
        let (router, _) = test_state(3600, 60);

        let resp = send(
            &router,
            Method::POST,
            "/v1/AUTH_a",
            &[("x-account-meta-recycled", "yes")],
            "",
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let resp = send(&router, Method::GET, "/v1/AUTH_a", &[], "").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(resp.headers().get("x-account-meta-recycled").unwrap(), "yes");
        let earliest: u64 = resp
            .headers()
            .get("x-account-meta-earliest-delete-date")
            .unwrap()
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        let now = epoch_now();
        assert!(earliest >= now + 3590 && earliest <= now + 3610);
        let body = body_text(resp).await;
        assert!(body.contains("X-Remove-Account-Meta-Recycled"));

        // HEAD masks the same way.
        let resp = send(&router, Method::HEAD, "/v1/AUTH_a", &[], "").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_recycled_account_masks_whole_subtree() {
        let (router, _) = test_state(3600, 60);
        put_object(&router, "/v1/AUTH_a/photos/cat.jpg", "meow").await;

        send(
            &router,
            Method::POST,
            "/v1/AUTH_a",
            &[("x-account-meta-recycled", "yes")],
            "",
        )
        .await;

        let resp = send(&router, Method::GET, "/v1/AUTH_a/photos", &[], "").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(resp.headers().get("x-account-meta-recycled").unwrap(), "yes");

        let resp = send(&router, Method::GET, "/v1/AUTH_a/photos/cat.jpg", &[], "").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unmark_account_restores_visibility() {
        let (router, upstream) = test_state(3600, 60);

        send(
            &router,
            Method::POST,
            "/v1/AUTH_a",
            &[("x-account-meta-recycled", "yes")],
            "",
        )
        .await;
        let resp = send(
            &router,
            Method::POST,
            "/v1/AUTH_a",
            &[("x-remove-account-meta-recycled", "x")],
            "",
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let resp = send(&router, Method::GET, "/v1/AUTH_a", &[], "").await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        // Both the flag and the timestamp are gone.
        let info = upstream.account_info("v1", "AUTH_a").await.unwrap().unwrap();
        assert!(info.meta.get("recycled").is_none());
        assert!(info.meta.get("recycled-at").is_none());
    }

    #[tokio::test]
    async fn test_unmark_wins_over_mark_on_same_request() {
        let (router, upstream) = test_state(3600, 60);

        let resp = send(
            &router,
            Method::POST,
            "/v1/AUTH_a",
            &[
                ("x-account-meta-recycled", "yes"),
                ("x-remove-account-meta-recycled", "x"),
            ],
            "",
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        let info = upstream.account_info("v1", "AUTH_a").await.unwrap().unwrap();
        assert!(info.meta.get("recycled").is_none());
        let resp = send(&router, Method::GET, "/v1/AUTH_a", &[], "").await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_direct_account_delete_rejected() {
        let (router, upstream) = test_state(3600, 60);
        upstream_post(&upstream, "/v1/AUTH_a", &[("x-account-meta-color", "blue")]).await;

        let resp = send(&router, Method::DELETE, "/v1/AUTH_a", &[], "").await;
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
        let body = body_text(resp).await;
        assert!(body.contains("mark for deletion"));

        // No side effect on stored data.
        let info = upstream.account_info("v1", "AUTH_a").await.unwrap().unwrap();
        assert_eq!(info.meta.get("color").map(String::as_str), Some("blue"));
    }

    #[tokio::test]
    async fn test_account_delete_gated_by_grace_period() {
        let (router, upstream) = test_state(3600, 60);

        send(
            &router,
            Method::POST,
            "/v1/AUTH_a",
            &[("x-account-meta-recycled", "yes")],
            "",
        )
        .await;

        // Inside the window: rejected, with the deadline echoed.
        let resp = send(&router, Method::DELETE, "/v1/AUTH_a", &[], "").await;
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(resp.headers().get("x-account-meta-recycled").unwrap(), "yes");
        assert!(resp
            .headers()
            .contains_key("x-account-meta-earliest-delete-date"));
        assert!(body_text(resp).await.contains("seconds remaining"));

        // Age the mark past the window service-side; DELETE passes.
        let aged = (epoch_now() - 4000).to_string();
        upstream_post(
            &upstream,
            "/v1/AUTH_a",
            &[("x-account-meta-recycled-at", aged.as_str())],
        )
        .await;
        let resp = send(&router, Method::DELETE, "/v1/AUTH_a", &[], "").await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_account_delete_zero_grace_is_immediate() {
        let (router, _) = test_state(0, 60);

        send(
            &router,
            Method::POST,
            "/v1/AUTH_a",
            &[("x-account-meta-recycled", "yes")],
            "",
        )
        .await;
        let resp = send(&router, Method::DELETE, "/v1/AUTH_a", &[], "").await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_remark_rearms_grace_window() {
        let (router, upstream) = test_state(3600, 60);

        // An old mark, aged past the window.
        let aged = (epoch_now() - 4000).to_string();
        upstream_post(
            &upstream,
            "/v1/AUTH_a",
            &[
                ("x-account-meta-recycled", "yes"),
                ("x-account-meta-recycled-at", aged.as_str()),
            ],
        )
        .await;

        // Re-marking resets the timestamp, closing the window again.
        send(
            &router,
            Method::POST,
            "/v1/AUTH_a",
            &[("x-account-meta-recycled", "yes")],
            "",
        )
        .await;
        let info = upstream.account_info("v1", "AUTH_a").await.unwrap().unwrap();
        let at: u64 = info.meta.get("recycled-at").unwrap().parse().unwrap();
        assert!(at > epoch_now() - 60);

        let resp = send(&router, Method::DELETE, "/v1/AUTH_a", &[], "").await;
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_account_reserved_headers_rejected() {
        let (router, _) = test_state(3600, 60);

        for header in [
            "x-account-meta-recycled-at",
            "x-remove-account-meta-recycled-at",
            "x-account-meta-earliest-delete-date",
        ] {
            let resp = send(&router, Method::POST, "/v1/AUTH_a", &[(header, "123")], "").await;
            assert_eq!(
                resp.status(),
                StatusCode::METHOD_NOT_ALLOWED,
                "{header} should be reserved"
            );
        }
    }

    #[tokio::test]
    async fn test_non_yes_account_mark_is_ordinary_metadata() {
        let (router, upstream) = test_state(3600, 60);

        send(
            &router,
            Method::POST,
            "/v1/AUTH_a",
            &[("x-account-meta-recycled", "maybe")],
            "",
        )
        .await;

        // Not a mark: no timestamp injected, reads stay visible.
        let info = upstream.account_info("v1", "AUTH_a").await.unwrap().unwrap();
        assert!(info.meta.get("recycled-at").is_none());
        let resp = send(&router, Method::GET, "/v1/AUTH_a", &[], "").await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_malformed_recycled_at_fails_open() {
        let (router, upstream) = test_state(3600, 60);
        upstream_post(
            &upstream,
            "/v1/AUTH_a",
            &[
                ("x-account-meta-recycled", "yes"),
                ("x-account-meta-recycled-at", "garbage"),
            ],
        )
        .await;

        // Corrupted bookkeeping never blocks reads.
        let resp = send(&router, Method::GET, "/v1/AUTH_a", &[], "").await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_missing_recycled_at_fails_safe() {
        let (router, upstream) = test_state(3600, 60);
        upstream_post(&upstream, "/v1/AUTH_a", &[("x-account-meta-recycled", "yes")]).await;

        // A valid mark without its timestamp counts as just marked:
        // reads are masked and DELETE stays closed.
        let resp = send(&router, Method::GET, "/v1/AUTH_a", &[], "").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let resp = send(&router, Method::DELETE, "/v1/AUTH_a", &[], "").await;
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    // -- Object flow ----------------------------------------------------------

    #[tokio::test]
    async fn test_mark_object_masks_and_schedules_expiry() {
        let (router, upstream) = test_state(3600, 60);
        put_object(&router, "/v1/a/c/o.txt", "hello").await;

        let resp = send(
            &router,
            Method::POST,
            "/v1/a/c/o.txt",
            &[("x-object-meta-recycled", "yes")],
            "",
        )
        .await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        // Reads are masked immediately, with the computed delete date.
        let resp = send(&router, Method::GET, "/v1/a/c/o.txt", &[], "").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(resp.headers().get("x-object-meta-recycled").unwrap(), "yes");
        let delete_date: u64 = resp
            .headers()
            .get("x-object-meta-delete-date")
            .unwrap()
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        let now = epoch_now();
        assert!(delete_date >= now + 50 && delete_date <= now + 70);
        assert!(body_text(resp).await.contains("X-Remove-Object-Meta-Recycled"));

        // The service holds the expiry directive; the bytes still exist.
        let resp = upstream
            .handle(ProxiedRequest {
                method: Method::GET,
                path: "/v1/a/c/o.txt".to_string(),
                query: None,
                headers: http::HeaderMap::new(),
                body: Bytes::new(),
            })
            .await;
        assert_eq!(resp.status, StatusCode::OK);
        assert!(resp.headers.contains_key("x-delete-at"));
    }

    #[tokio::test]
    async fn test_unmark_object_cancels_expiry() {
        let (router, upstream) = test_state(3600, 60);
        put_object(&router, "/v1/a/c/o.txt", "hello").await;

        send(
            &router,
            Method::POST,
            "/v1/a/c/o.txt",
            &[("x-object-meta-recycled", "yes")],
            "",
        )
        .await;
        let resp = send(
            &router,
            Method::POST,
            "/v1/a/c/o.txt",
            &[("x-remove-object-meta-recycled", "x")],
            "",
        )
        .await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        // Normal visibility restored, pending deletion gone.
        let resp = send(&router, Method::GET, "/v1/a/c/o.txt", &[], "").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp.headers().get("x-delete-at").is_none());
        assert_eq!(body_text(resp).await, "hello");

        let info = upstream.object_info("v1", "a", "c", "o.txt").await.unwrap().unwrap();
        assert!(info.meta.get("recycled").is_none());
        assert!(info.meta.get("recycled-at").is_none());
    }

    #[tokio::test]
    async fn test_expired_object_is_an_ordinary_not_found() {
        let (router, upstream) = test_state(3600, 60);
        put_object(&router, "/v1/a/c/o.txt", "hello").await;

        send(
            &router,
            Method::POST,
            "/v1/a/c/o.txt",
            &[("x-object-meta-recycled", "yes")],
            "",
        )
        .await;

        // The service's expiry fires (deadline forced into the past).
        upstream_post(&upstream, "/v1/a/c/o.txt", &[("x-delete-at", "1")]).await;

        // Mark state died with the object: plain 404, no recycle headers,
        // and unmark can no longer help.
        let resp = send(&router, Method::GET, "/v1/a/c/o.txt", &[], "").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert!(resp.headers().get("x-object-meta-recycled").is_none());

        let resp = send(
            &router,
            Method::POST,
            "/v1/a/c/o.txt",
            &[("x-remove-object-meta-recycled", "x")],
            "",
        )
        .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_object_delete_always_rejected() {
        let (router, _) = test_state(3600, 60);
        put_object(&router, "/v1/a/c/o.txt", "hello").await;

        let resp = send(&router, Method::DELETE, "/v1/a/c/o.txt", &[], "").await;
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert!(body_text(resp).await.contains("X-Object-Meta-Recycled"));

        // Still there.
        let resp = send(&router, Method::GET, "/v1/a/c/o.txt", &[], "").await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_object_invalid_mark_value_rejected() {
        let (router, _) = test_state(3600, 60);
        put_object(&router, "/v1/a/c/o.txt", "hello").await;

        let resp = send(
            &router,
            Method::POST,
            "/v1/a/c/o.txt",
            &[("x-object-meta-recycled", "maybe")],
            "",
        )
        .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_object_reserved_headers_rejected() {
        let (router, _) = test_state(3600, 60);
        put_object(&router, "/v1/a/c/o.txt", "hello").await;

        for header in ["x-delete-at", "x-delete-after", "x-object-meta-recycled-at"] {
            let resp = send(
                &router,
                Method::PUT,
                "/v1/a/c/o.txt",
                &[(header, "123")],
                "data",
            )
            .await;
            assert_eq!(
                resp.status(),
                StatusCode::METHOD_NOT_ALLOWED,
                "{header} should be reserved"
            );
        }
    }

    #[tokio::test]
    async fn test_put_can_carry_object_mark() {
        let (router, _) = test_state(3600, 60);
        put_object(&router, "/v1/a/c/o.txt", "hello").await;

        let resp = send(
            &router,
            Method::PUT,
            "/v1/a/c/o.txt",
            &[("x-object-meta-recycled", "yes")],
            "replaced",
        )
        .await;
        assert_eq!(resp.status(), StatusCode::CREATED);

        let resp = send(&router, Method::GET, "/v1/a/c/o.txt", &[], "").await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(resp.headers().get("x-object-meta-recycled").unwrap(), "yes");
    }

    // -- Containers and pass-through ------------------------------------------

    #[tokio::test]
    async fn test_container_delete_follows_service_rule() {
        let (router, upstream) = test_state(3600, 60);
        put_object(&router, "/v1/a/c/o.txt", "hello").await;

        // Marking the object does not change the container's own rule:
        // it is still non-empty until the expiry actually fires.
        send(
            &router,
            Method::POST,
            "/v1/a/c/o.txt",
            &[("x-object-meta-recycled", "yes")],
            "",
        )
        .await;
        let resp = send(&router, Method::DELETE, "/v1/a/c", &[], "").await;
        assert_eq!(resp.status(), StatusCode::CONFLICT);

        // Once the object has expired, the service accepts the DELETE.
        upstream_post(&upstream, "/v1/a/c/o.txt", &[("x-delete-at", "1")]).await;
        let resp = send(&router, Method::DELETE, "/v1/a/c", &[], "").await;
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_unclassified_path_passes_through() {
        let (router, _) = test_state(3600, 60);

        let resp = send(&router, Method::GET, "/info", &[], "").await;
        // The memory upstream answers for paths it does not recognize.
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        // Gateway headers are present even on relayed responses.
        assert!(resp.headers().contains_key("x-trans-id"));
        assert_eq!(resp.headers().get("server").unwrap(), "RecycleGate");
    }

    #[tokio::test]
    async fn test_health() {
        let (router, _) = test_state(3600, 60);
        let resp = send(&router, Method::GET, "/health", &[], "").await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(body_text(resp).await.contains("ok"));
    }
}
