//! Recycle-state interpretation shared by the account and object guards.
//!
//! The guards are pure transformers: they read metadata the upstream
//! service reports, decide, and either rewrite headers on the way through
//! or synthesize a response.  The decision logic lives here as plain
//! functions over parsed state so it can be exercised without a server.

pub mod account;
pub mod object;

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::headers::MARK_VALUE;

/// Current time in epoch seconds.
pub fn epoch_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Recycle state parsed from a resource's metadata map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecycleState {
    /// Whether the resource carries a valid recycle mark.
    pub marked: bool,
    /// Epoch seconds at which the mark was set.  `None` with `marked` set
    /// means the bookkeeping timestamp is missing; the resource is then
    /// treated as just marked.
    pub marked_at: Option<u64>,
}

impl RecycleState {
    /// Parse recycle state from a metadata map (`recycled`, `recycled-at`).
    ///
    /// A mark value other than `yes` is no mark at all.  A present but
    /// unparsable `recycled-at` is corrupted bookkeeping: the whole state
    /// reads as unmarked, so the gateway never blocks access because of
    /// its own records.  A missing `recycled-at` keeps the mark and reads
    /// as just-marked, which keeps the grace period closed.
    pub fn from_meta(meta: &HashMap<String, String>) -> Self {
        let unmarked = RecycleState {
            marked: false,
            marked_at: None,
        };

        match meta.get("recycled").map(String::as_str) {
            Some(MARK_VALUE) => {}
            _ => return unmarked,
        }

        match meta.get("recycled-at") {
            None => RecycleState {
                marked: true,
                marked_at: None,
            },
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(at) => RecycleState {
                    marked: true,
                    marked_at: Some(at),
                },
                Err(_) => {
                    tracing::warn!(
                        "malformed recycled-at timestamp {:?}, ignoring recycle mark",
                        raw
                    );
                    unmarked
                }
            },
        }
    }

    /// The deadline after which deletion is acceptable (or scheduled), given
    /// a grace period.  A missing mark timestamp counts as marked right now.
    pub fn deadline(&self, now: u64, grace_seconds: u64) -> u64 {
        self.marked_at.unwrap_or(now).saturating_add(grace_seconds)
    }
}

/// Outcome of an account DELETE against the recycle policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteVerdict {
    /// No mark: direct deletion is never allowed.
    NotMarked,
    /// Marked, but the grace period has not elapsed.
    Wait { earliest: u64, remaining: u64 },
    /// Marked and aged: let the DELETE through.
    Allowed,
}

/// Decide whether a DELETE may pass, per the mark -> wait -> delete policy.
pub fn delete_verdict(state: &RecycleState, now: u64, grace_seconds: u64) -> DeleteVerdict {
    if !state.marked {
        return DeleteVerdict::NotMarked;
    }
    let earliest = state.deadline(now, grace_seconds);
    if now >= earliest {
        DeleteVerdict::Allowed
    } else {
        DeleteVerdict::Wait {
            earliest,
            remaining: earliest - now,
        }
    }
}

/// Build the synthesized 404 that stands in for a recycled resource.
///
/// The response must tell the caller how to undelete; clearing the mark is
/// the only recovery path there is.
pub fn masked_not_found(recycled_header: &'static str, deadline_header: &'static str, deadline: u64, body: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        [
            ("content-type", "text/plain".to_string()),
            (recycled_header, MARK_VALUE.to_string()),
            (deadline_header, deadline.to_string()),
        ],
        format!("{body}\n"),
    )
        .into_response()
}

// -- Tests --------------------------------------------------------------------
