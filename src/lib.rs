//! RecycleGate library -- mark-for-deletion enforcement gateway.
//!
//! This crate provides the components for running an HTTP gateway in front
//! of a Swift-style object storage service: request classification, the
//! account and object recycle guards, and pluggable upstream transports.
//! The gateway inserts a mandatory grace period between "marked for
//! deletion" and any deletion actually becoming effective, without touching
//! any behavior the storage service already guarantees for unmarked
//! resources.

use std::sync::Arc;

pub mod config;
pub mod errors;
pub mod guards;
pub mod headers;
pub mod metrics;
pub mod path;
pub mod server;
pub mod upstream;

use crate::config::Config;
use crate::upstream::store::UpstreamStore;

/// Shared application state passed to all handlers via `axum::extract::State`.
///
/// Deliberately nothing mutable lives here: the gateway is stateless and
/// re-reads recycle state from the upstream service on every request.
pub struct AppState {
    /// Gateway configuration.
    pub config: Config,
    /// Upstream storage service (HTTP proxy or in-memory).
    pub upstream: Arc<dyn UpstreamStore>,
}
