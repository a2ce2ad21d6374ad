//! Request routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request
//!     → pipeline.rs (RoutingCore::handle)
//!         → LoadBalancer picks an alive backend (or 503)
//!         → connection guard taken on the backend
//!         → Forwarder sends the request upstream (502 on failure)
//!         → guard carried by the response body, count restored when it ends
//!     → RouteOutcome rendered as the response
//! ```
//!
//! # Design Decisions
//! - Routing is global: every request goes through the same balancer
//! - The transport is a trait seam so the pipeline is testable without sockets
//! - Single attempt per request: no retry against another backend
//! - No lock held across the upstream call

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, Response};
use futures_util::future::BoxFuture;
use thiserror::Error;

use crate::load_balancer::backend::Backend;

pub mod pipeline;

pub use pipeline::{RouteOutcome, RoutingCore};

/// Failure while forwarding a request to an upstream.
///
/// Every variant is surfaced the same way, as a gateway error.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("invalid upstream uri: {0}")]
    InvalidUri(String),

    #[error("upstream request failed: {0}")]
    Upstream(String),

    #[error("upstream timed out after {0:?}")]
    Timeout(Duration),
}

pub type ForwardResult = Result<Response<Body>, ForwardError>;

/// Transport that carries one request to the selected backend.
pub trait Forwarder: Send + Sync {
    fn forward<'a>(&'a self, backend: &'a Backend, request: Request<Body>) -> BoxFuture<'a, ForwardResult>;
}
