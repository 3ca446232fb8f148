//! Object Guard.
//!
//! Objects differ from accounts in one key way: deletion is automatic.
//! Marking an object installs the service's own delayed-expiry directive
//! alongside the mark, and the service hard-deletes the object when the
//! deadline passes -- no second request exists.  The guard's job is to
//! install or cancel that directive atomically with the mark metadata and
//! to mask the object's visibility during the grace window.

use axum::http::{HeaderValue, Method};
use axum::response::{IntoResponse, Response};
use metrics::counter;
use tracing::{debug, warn};

use crate::errors::GateError;
use crate::headers::{
    DELETE_AFTER, DELETE_AT, MARK_VALUE, OBJECT_DELETE_DATE, OBJECT_RECYCLED, OBJECT_RECYCLED_AT,
    OBJECT_REMOVE_DELETE_DATE, OBJECT_REMOVE_RECYCLED, OBJECT_REMOVE_RECYCLED_AT,
    REMOVE_DELETE_AFTER, REMOVE_DELETE_AT,
};
use crate::metrics::INTERCEPTIONS_TOTAL;
use crate::upstream::store::ProxiedRequest;
use crate::AppState;

use super::{epoch_now, masked_not_found, RecycleState};

/// Undelete instructions carried on every masked object response.
const MASK_BODY: &str =
    "Object is marked for deletion. Send X-Remove-Object-Meta-Recycled header via POST to undelete.";

/// Expiry and bookkeeping headers clients may not touch themselves; the
/// recycle mechanism owns the object lifecycle end to end.
const RESERVED_HEADERS: &[&str] = &[
    DELETE_AT,
    DELETE_AFTER,
    REMOVE_DELETE_AT,
    REMOVE_DELETE_AFTER,
    OBJECT_RECYCLED_AT,
    OBJECT_REMOVE_RECYCLED_AT,
    OBJECT_DELETE_DATE,
    OBJECT_REMOVE_DELETE_DATE,
];

/// Intercept a request addressed to an object.
pub async fn intercept(
    state: &AppState,
    version: &str,
    account: &str,
    container: &str,
    object: &str,
    mut req: ProxiedRequest,
) -> Result<Response, GateError> {
    match req.method {
        Method::GET | Method::HEAD => {
            match object_recycle_state(state, version, account, container, object).await {
                Some(recycle) if recycle.marked => {
                    let now = epoch_now();
                    let delete_date =
                        recycle.deadline(now, state.config.recycle.object_recycled_seconds);
                    debug!("masking read of recycled object {}/{}", container, object);
                    counter!(INTERCEPTIONS_TOTAL, "resource" => "object", "action" => "masked")
                        .increment(1);
                    Ok(masked_not_found(
                        OBJECT_RECYCLED,
                        OBJECT_DELETE_DATE,
                        delete_date,
                        MASK_BODY,
                    ))
                }
                // Unmarked, already expired, or unreadable state: the
                // service's own answer is the right one.
                _ => forward(state, req).await,
            }
        }

        Method::DELETE => {
            counter!(INTERCEPTIONS_TOTAL, "resource" => "object", "action" => "rejected")
                .increment(1);
            Err(GateError::ObjectDeleteNotAllowed)
        }

        // PUT can carry the mark too: a replaced object may be born marked.
        Method::POST | Method::PUT => {
            if let Some(header) = RESERVED_HEADERS
                .iter()
                .find(|h| req.headers.contains_key(**h))
            {
                counter!(INTERCEPTIONS_TOTAL, "resource" => "object", "action" => "rejected")
                    .increment(1);
                return Err(GateError::ReservedHeader {
                    header: header.to_string(),
                });
            }

            // Unmark wins over mark when a request carries both; safety
            // favors not deleting.  The mark header is dropped so the
            // service cannot re-set the flag in the same write.
            if req.headers.contains_key(OBJECT_REMOVE_RECYCLED) {
                req.headers.remove(OBJECT_RECYCLED);
                req.headers
                    .insert(OBJECT_REMOVE_RECYCLED, HeaderValue::from_static("x"));
                req.headers
                    .insert(OBJECT_REMOVE_RECYCLED_AT, HeaderValue::from_static("x"));
                // Cancel the pending automatic deletion along with the mark.
                req.headers
                    .insert(REMOVE_DELETE_AT, HeaderValue::from_static("x"));
                req.headers
                    .insert(REMOVE_DELETE_AFTER, HeaderValue::from_static("x"));
                debug!("clearing recycle mark on object {}/{}", container, object);
                counter!(INTERCEPTIONS_TOTAL, "resource" => "object", "action" => "unmarked")
                    .increment(1);
            } else if let Some(value) = req.headers.get(OBJECT_RECYCLED) {
                if value.to_str().ok().map(str::trim) != Some(MARK_VALUE) {
                    counter!(INTERCEPTIONS_TOTAL, "resource" => "object", "action" => "rejected")
                        .increment(1);
                    return Err(GateError::InvalidMarkValue);
                }

                // Mark and schedule the automatic expiry in one request so
                // the two can never disagree.
                let now = epoch_now();
                let delay = state.config.recycle.object_recycled_seconds;
                req.headers
                    .insert(OBJECT_RECYCLED, HeaderValue::from_static(MARK_VALUE));
                req.headers.insert(
                    OBJECT_RECYCLED_AT,
                    HeaderValue::from_str(&now.to_string()).unwrap(),
                );
                req.headers.insert(
                    DELETE_AFTER,
                    HeaderValue::from_str(&delay.to_string()).unwrap(),
                );
                debug!(
                    "marking object {}/{} for deletion, expires in {}s",
                    container, object, delay
                );
                counter!(INTERCEPTIONS_TOTAL, "resource" => "object", "action" => "marked")
                    .increment(1);
            }

            forward(state, req).await
        }

        _ => forward(state, req).await,
    }
}

/// Read the object's recycle state, failing open on any lookup problem.
async fn object_recycle_state(
    state: &AppState,
    version: &str,
    account: &str,
    container: &str,
    object: &str,
) -> Option<RecycleState> {
    match state
        .upstream
        .object_info(version, account, container, object)
        .await
    {
        Ok(Some(info)) => Some(RecycleState::from_meta(&info.meta)),
        Ok(None) => None,
        Err(err) => {
            warn!(
                "object info lookup failed for {}/{}: {:#}",
                container, object, err
            );
            None
        }
    }
}

/// Forward a request upstream and relay the response.
async fn forward(state: &AppState, req: ProxiedRequest) -> Result<Response, GateError> {
    let response = state.upstream.forward(req).await?;
    Ok(response.into_response())
}
