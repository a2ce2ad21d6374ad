//! Per-request routing pipeline.
//!
//! # Responsibilities
//! - Own the backend pool, the selected load balancer and the health monitor
//! - Select → count-up → forward → count-down for each request
//! - The count-down happens when the response body is done, not at the response head
//! - Map the result to exactly one of: forwarded, 503, 502

use std::sync::Arc;
use std::time::Instant;

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::response::IntoResponse;
use futures_util::StreamExt;

use crate::config::ProxyConfig;
use crate::health::{HealthMonitor, HealthSettings};
use crate::load_balancer::{
    backend::{Backend, ConnectionGuard},
    pool::{BackendPool, PoolError},
    Algorithm, LoadBalancer,
};
use crate::observability::metrics;
use crate::routing::{ForwardError, Forwarder};

/// Observable result of routing one request.
pub enum RouteOutcome {
    /// The upstream response, returned as-is.
    Forwarded {
        backend: Arc<Backend>,
        response: Response<Body>,
    },
    /// No alive backend was available.
    Unavailable,
    /// The selected backend could not be reached or did not answer in time.
    BadGateway {
        backend: Arc<Backend>,
        error: ForwardError,
    },
}

impl RouteOutcome {
    pub fn status(&self) -> StatusCode {
        match self {
            RouteOutcome::Forwarded { response, .. } => response.status(),
            RouteOutcome::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            RouteOutcome::BadGateway { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    /// The backend the request was sent to, if any.
    pub fn backend(&self) -> Option<&Arc<Backend>> {
        match self {
            RouteOutcome::Forwarded { backend, .. } | RouteOutcome::BadGateway { backend, .. } => {
                Some(backend)
            }
            RouteOutcome::Unavailable => None,
        }
    }
}

impl IntoResponse for RouteOutcome {
    fn into_response(self) -> axum::response::Response {
        match self {
            RouteOutcome::Forwarded { response, .. } => response.into_response(),
            RouteOutcome::Unavailable => {
                (StatusCode::SERVICE_UNAVAILABLE, "No healthy backends available").into_response()
            }
            RouteOutcome::BadGateway { .. } => {
                (StatusCode::BAD_GATEWAY, "Bad Gateway").into_response()
            }
        }
    }
}

/// The request-routing core: backend pool, strategy, health monitor and transport.
pub struct RoutingCore {
    pool: BackendPool,
    algorithm: Algorithm,
    balancer: Box<dyn LoadBalancer>,
    health: Option<HealthMonitor>,
    forwarder: Arc<dyn Forwarder>,
}

impl RoutingCore {
    /// Build a core over an existing pool. `health: None` disables health checking.
    pub fn new(
        pool: BackendPool,
        algorithm: Algorithm,
        health: Option<HealthSettings>,
        forwarder: Arc<dyn Forwarder>,
    ) -> Self {
        let balancer = algorithm.build(pool.clone());
        let health = health.map(|settings| HealthMonitor::new(pool.clone(), settings));

        tracing::info!(
            algorithm = %algorithm,
            backends = pool.len(),
            health_checks = health.is_some(),
            "Routing core ready"
        );

        Self {
            pool,
            algorithm,
            balancer,
            health,
            forwarder,
        }
    }

    /// Build a core from configuration. Fails if the backend list is empty or invalid.
    pub fn from_config(config: &ProxyConfig, forwarder: Arc<dyn Forwarder>) -> Result<Self, PoolError> {
        let pool = BackendPool::from_configs(&config.backends)?;
        let algorithm = Algorithm::from_name(&config.load_balancer.algorithm);
        let health = config
            .health_check
            .enabled
            .then(|| HealthSettings::from(&config.health_check));

        Ok(Self::new(pool, algorithm, health, forwarder))
    }

    pub fn pool(&self) -> &BackendPool {
        &self.pool
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn health_monitor(&self) -> Option<&HealthMonitor> {
        self.health.as_ref()
    }

    /// Ask the load balancer for the next alive backend.
    pub fn next_backend(&self) -> Option<Arc<Backend>> {
        self.balancer.next_backend()
    }

    /// Start background health checking. No-op when disabled or already running.
    pub fn start_health_checking(&self) {
        if let Some(health) = &self.health {
            health.start();
        }
    }

    /// Stop background health checking. No-op when disabled or not running.
    pub fn stop_health_checking(&self) {
        if let Some(health) = &self.health {
            health.stop();
        }
    }

    /// Route a single request.
    pub async fn handle(&self, request: Request<Body>) -> RouteOutcome {
        let start_time = Instant::now();
        let method = request.method().clone();
        let path = request.uri().path().to_string();

        let Some(backend) = self.balancer.next_backend() else {
            tracing::warn!(method = %method, path = %path, "No healthy backends available");
            metrics::record_request(method.as_str(), 503, "none", start_time);
            return RouteOutcome::Unavailable;
        };

        let guard = backend.acquire();
        metrics::record_backend_connections(backend.address(), guard.connections());

        tracing::debug!(
            method = %method,
            path = %path,
            backend = %backend,
            "Proxying request"
        );

        let result = self.forwarder.forward(&guard, request).await;

        match result {
            Ok(response) => {
                metrics::record_request(
                    method.as_str(),
                    response.status().as_u16(),
                    backend.address(),
                    start_time,
                );
                let response = response.map(|body| hold_until_sent(body, guard));
                RouteOutcome::Forwarded { backend, response }
            }
            Err(error) => {
                drop(guard);
                tracing::error!(
                    method = %method,
                    path = %path,
                    backend = %backend,
                    error = %error,
                    "Upstream error"
                );
                metrics::record_request(method.as_str(), 502, backend.address(), start_time);
                RouteOutcome::BadGateway { backend, error }
            }
        }
    }
}

/// Keep the backend's connection counted while the upstream body streams to the client.
///
/// The guard is dropped with the body, whether it was fully sent or abandoned.
fn hold_until_sent(body: Body, guard: ConnectionGuard) -> Body {
    Body::from_stream(body.into_data_stream().map(move |chunk| {
        let _held = &guard;
        chunk
    }))
}

impl std::fmt::Debug for RoutingCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingCore")
            .field("algorithm", &self.algorithm)
            .field("pool", &self.pool)
            .field("health", &self.health)
            .finish_non_exhaustive()
    }
}
