//! Gateway error types.
//!
//! Every variant is a policy decision or an upstream failure.  The enum
//! implements [`axum::response::IntoResponse`] so handlers can simply
//! return `Err(GateError::AccountNotMarked)`.  Bodies are plain text in
//! the storage service's own style; masked 404s are not errors and are
//! synthesized directly by the guards.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::headers;

/// Generate a Swift-style transaction ID (`tx` + 24 hex chars).
pub fn generate_trans_id() -> String {
    let bytes: [u8; 12] = rand::random();
    format!("tx{}", hex::encode(bytes))
}

/// Policy and proxy errors surfaced to the caller.
#[derive(Debug, Error)]
pub enum GateError {
    /// DELETE on an account that carries no recycle mark.
    #[error("Account cannot be deleted directly. Send 'X-Account-Meta-Recycled: yes' in POST request to mark for deletion.")]
    AccountNotMarked,

    /// DELETE on a marked account whose grace period has not elapsed.
    #[error("Account cannot be deleted yet, earliest delete date not reached ({remaining} seconds remaining).")]
    GracePeriodActive {
        /// Epoch seconds at which DELETE becomes acceptable.
        earliest: u64,
        /// Seconds left until `earliest`.
        remaining: u64,
    },

    /// DELETE on an object path; objects are deleted via the recycle mark.
    #[error("DELETE requests are not allowed. Use POST with 'X-Object-Meta-Recycled: yes' instead.")]
    ObjectDeleteNotAllowed,

    /// Client tried to set or remove a bookkeeping header directly.
    #[error("Header {header} cannot be set manually. Use the recycle mark headers instead.")]
    ReservedHeader { header: String },

    /// The object mark header carried a value other than `yes`.
    #[error("Invalid value for X-Object-Meta-Recycled. Only 'yes' is allowed.")]
    InvalidMarkValue,

    /// The upstream storage service could not be reached or answered
    /// with a transport-level failure.
    #[error("Error talking to the storage service.")]
    Upstream(#[from] anyhow::Error),
}

impl GateError {
    /// Return the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GateError::AccountNotMarked => StatusCode::METHOD_NOT_ALLOWED,
            GateError::GracePeriodActive { .. } => StatusCode::METHOD_NOT_ALLOWED,
            GateError::ObjectDeleteNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            GateError::ReservedHeader { .. } => StatusCode::METHOD_NOT_ALLOWED,
            GateError::InvalidMarkValue => StatusCode::BAD_REQUEST,
            GateError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for GateError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = format!("{}\n", self);

        // A rejected DELETE inside the grace window echoes the recycle
        // state so callers can see when the account becomes deletable.
        if let GateError::GracePeriodActive { earliest, .. } = &self {
            return (
                status,
                [
                    ("content-type", "text/plain".to_string()),
                    (headers::ACCOUNT_RECYCLED, headers::MARK_VALUE.to_string()),
                    (headers::ACCOUNT_EARLIEST_DELETE_DATE, earliest.to_string()),
                ],
                body,
            )
                .into_response();
        }

        if let GateError::Upstream(err) = &self {
            tracing::error!("upstream failure: {:#}", err);
        }

        (status, [("content-type", "text/plain")], body).into_response()
    }
}

// -- Tests --------------------------------------------------------------------
