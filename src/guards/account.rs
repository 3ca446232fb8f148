//! Account Guard.
//!
//! Accounts are deleted through a three-step path: mark (POST), wait out
//! the grace period, DELETE.  While marked, the account -- and everything
//! under it -- reads as 404.  A direct DELETE never succeeds, marked or
//! not, until the recorded mark has aged past `account_recycled_seconds`.

use axum::http::{HeaderValue, Method};
use axum::response::{IntoResponse, Response};
use metrics::counter;
use tracing::{debug, warn};

use crate::errors::GateError;
use crate::headers::{
    ACCOUNT_EARLIEST_DELETE_DATE, ACCOUNT_RECYCLED, ACCOUNT_RECYCLED_AT,
    ACCOUNT_REMOVE_EARLIEST_DELETE_DATE, ACCOUNT_REMOVE_RECYCLED, ACCOUNT_REMOVE_RECYCLED_AT,
    MARK_VALUE,
};
use crate::metrics::INTERCEPTIONS_TOTAL;
use crate::upstream::store::ProxiedRequest;
use crate::AppState;

use super::{delete_verdict, epoch_now, masked_not_found, DeleteVerdict, RecycleState};

/// Undelete instructions carried on every masked account response.
const MASK_BODY: &str =
    "Account is marked for deletion. Send X-Remove-Account-Meta-Recycled header via POST to undelete.";

/// Bookkeeping headers clients may not set or remove themselves.
const RESERVED_HEADERS: &[&str] = &[
    ACCOUNT_RECYCLED_AT,
    ACCOUNT_REMOVE_RECYCLED_AT,
    ACCOUNT_EARLIEST_DELETE_DATE,
    ACCOUNT_REMOVE_EARLIEST_DELETE_DATE,
];

/// Mask any read under a recycled account.
///
/// Returns the synthesized 404 when the account is marked; `None` lets the
/// request continue.  Lookup failures fail open: the gateway never turns
/// its own inability to read bookkeeping into a denial of access.
pub async fn mask_recycled(state: &AppState, version: &str, account: &str) -> Option<Response> {
    let info = match state.upstream.account_info(version, account).await {
        Ok(Some(info)) => info,
        Ok(None) => return None,
        Err(err) => {
            warn!("account info lookup failed for {}: {:#}", account, err);
            return None;
        }
    };

    let recycle = RecycleState::from_meta(&info.meta);
    if !recycle.marked {
        return None;
    }

    let now = epoch_now();
    let earliest = recycle.deadline(now, state.config.recycle.account_recycled_seconds);
    debug!("masking read under recycled account {}", account);
    counter!(INTERCEPTIONS_TOTAL, "resource" => "account", "action" => "masked").increment(1);

    Some(masked_not_found(
        ACCOUNT_RECYCLED,
        ACCOUNT_EARLIEST_DELETE_DATE,
        earliest,
        MASK_BODY,
    ))
}

/// Intercept a request addressed to the account resource itself.
pub async fn intercept(
    state: &AppState,
    version: &str,
    account: &str,
    mut req: ProxiedRequest,
) -> Result<Response, GateError> {
    match req.method {
        Method::POST => {
            if let Some(header) = RESERVED_HEADERS
                .iter()
                .find(|h| req.headers.contains_key(**h))
            {
                counter!(INTERCEPTIONS_TOTAL, "resource" => "account", "action" => "rejected")
                    .increment(1);
                return Err(GateError::ReservedHeader {
                    header: header.to_string(),
                });
            }

            // Unmark wins over mark when a request carries both; safety
            // favors not deleting.  The mark header is dropped so the
            // service cannot re-set the flag in the same write.
            if req.headers.contains_key(ACCOUNT_REMOVE_RECYCLED) {
                req.headers.remove(ACCOUNT_RECYCLED);
                req.headers
                    .insert(ACCOUNT_REMOVE_RECYCLED, HeaderValue::from_static("x"));
                req.headers
                    .insert(ACCOUNT_REMOVE_RECYCLED_AT, HeaderValue::from_static("x"));
                debug!("clearing recycle mark on account {}", account);
                counter!(INTERCEPTIONS_TOTAL, "resource" => "account", "action" => "unmarked")
                    .increment(1);
            } else if req
                .headers
                .get(ACCOUNT_RECYCLED)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                == Some(MARK_VALUE)
            {
                // Re-marking an already-marked account re-arms the window.
                let now = epoch_now();
                req.headers
                    .insert(ACCOUNT_RECYCLED, HeaderValue::from_static(MARK_VALUE));
                req.headers.insert(
                    ACCOUNT_RECYCLED_AT,
                    HeaderValue::from_str(&now.to_string()).unwrap(),
                );
                debug!("marking account {} for deletion at {}", account, now);
                counter!(INTERCEPTIONS_TOTAL, "resource" => "account", "action" => "marked")
                    .increment(1);
            }

            forward(state, req).await
        }

        Method::DELETE => {
            let recycle = match state.upstream.account_info(version, account).await {
                Ok(Some(info)) => RecycleState::from_meta(&info.meta),
                Ok(None) => return forward(state, req).await,
                Err(err) => {
                    warn!("account info lookup failed for {}: {:#}", account, err);
                    return forward(state, req).await;
                }
            };

            match delete_verdict(
                &recycle,
                epoch_now(),
                state.config.recycle.account_recycled_seconds,
            ) {
                DeleteVerdict::Allowed => forward(state, req).await,
                DeleteVerdict::NotMarked => {
                    counter!(INTERCEPTIONS_TOTAL, "resource" => "account", "action" => "rejected")
                        .increment(1);
                    Err(GateError::AccountNotMarked)
                }
                DeleteVerdict::Wait {
                    earliest,
                    remaining,
                } => {
                    counter!(INTERCEPTIONS_TOTAL, "resource" => "account", "action" => "rejected")
                        .increment(1);
                    Err(GateError::GracePeriodActive {
                        earliest,
                        remaining,
                    })
                }
            }
        }

        _ => forward(state, req).await,
    }
}

/// Forward a request upstream and relay the response.
async fn forward(state: &AppState, req: ProxiedRequest) -> Result<Response, GateError> {
    let response = state.upstream.forward(req).await?;
    Ok(response.into_response())
}
