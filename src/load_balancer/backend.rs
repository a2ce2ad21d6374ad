//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single backend server
//! - Track active connections (for Least Connections LB)
//! - Track liveness (alive/dead) as written by the health monitor

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use url::Url;

use crate::observability::metrics;

/// Parse a configured backend address into a base URL.
///
/// Addresses without a scheme ("127.0.0.1:3000", "localhost:3000") are treated as `http`.
pub fn parse_backend_url(address: &str) -> Result<Url, url::ParseError> {
    let address = address.trim();
    if address.contains("://") {
        Url::parse(address)
    } else {
        Url::parse(&format!("http://{}", address))
    }
}

/// A single backend server.
#[derive(Debug)]
pub struct Backend {
    /// Base URL of the backend.
    url: Url,
    /// Weight for weighted round-robin, always >= 1.
    weight: u32,
    /// Liveness flag; starts optimistic.
    alive: AtomicBool,
    /// Number of in-flight proxied requests.
    connections: AtomicUsize,
}

impl Backend {
    /// Create a new backend. A weight of zero is normalized to 1.
    pub fn new(url: Url, weight: u32) -> Self {
        Self {
            url,
            weight: weight.max(1),
            alive: AtomicBool::new(true),
            connections: AtomicUsize::new(0),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Address used in logs and metric labels (the base URL without a trailing slash).
    pub fn address(&self) -> &str {
        self.url.as_str().trim_end_matches('/')
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Set liveness, returning the previous value.
    pub fn set_alive(&self, alive: bool) -> bool {
        self.alive.swap(alive, Ordering::AcqRel)
    }

    /// Get the current number of active connections.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    /// Increment active connection count.
    pub fn inc_connections(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    /// Decrement active connection count. Never goes below zero.
    pub fn dec_connections(&self) {
        let _ = self
            .connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// Count a new connection and return a guard that releases it on drop.
    pub fn acquire(self: &Arc<Self>) -> ConnectionGuard {
        self.inc_connections();
        ConnectionGuard {
            backend: self.clone(),
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.address())
    }
}

/// A RAII guard that manages the active connection count.
///
/// Dropped on every exit path of a proxied request, including unwinding.
/// For a forwarded response it lives inside the response body and is released
/// once the body has been fully sent or abandoned.
#[derive(Debug)]
pub struct ConnectionGuard {
    backend: Arc<Backend>,
}

impl ConnectionGuard {
    pub fn backend(&self) -> &Arc<Backend> {
        &self.backend
    }
}

impl Deref for ConnectionGuard {
    type Target = Backend;
    fn deref(&self) -> &Self::Target {
        &self.backend
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.backend.dec_connections();
        metrics::record_backend_connections(self.backend.address(), self.backend.connections());
    }
}
