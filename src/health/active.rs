//! Active health checking.
//!
//! # Responsibilities
//! - Periodically probe every backend, concurrently
//! - Update backend liveness from probe results
//! - Start/stop on demand without aborting probes already in flight

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Method, Request};
use futures_util::future::join_all;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use tokio::sync::broadcast;
use tokio::time::{self, MissedTickBehavior};

use crate::config::HealthCheckConfig;
use crate::health::state::{self, ProbeFailure, ProbeOutcome, Transition};
use crate::lifecycle::Shutdown;
use crate::load_balancer::{backend::Backend, pool::BackendPool};
use crate::observability::metrics;

const USER_AGENT: &str = "lb-proxy-health-check";

/// Floor for the probe interval; `tokio::time::interval` rejects a zero period.
pub const MIN_INTERVAL: Duration = Duration::from_millis(100);

/// Probe schedule and target.
#[derive(Debug, Clone)]
pub struct HealthSettings {
    pub interval: Duration,
    pub timeout: Duration,
    pub path: String,
}

impl From<&HealthCheckConfig> for HealthSettings {
    fn from(config: &HealthCheckConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.interval_secs).max(MIN_INTERVAL),
            timeout: Duration::from_secs(config.timeout_secs),
            path: config.path.clone(),
        }
    }
}

/// Probe target for a backend: its base URL followed by the health path.
pub fn probe_url(backend: &Backend, path: &str) -> String {
    format!("{}{}", backend.address(), path)
}

struct Prober {
    pool: BackendPool,
    settings: HealthSettings,
    client: Client<HttpConnector, Body>,
}

impl Prober {
    async fn run(self: Arc<Self>, mut shutdown: broadcast::Receiver<()>) {
        tracing::info!(
            interval = ?self.settings.interval,
            timeout = ?self.settings.timeout,
            path = %self.settings.path,
            backends = self.pool.len(),
            "Health monitor starting"
        );

        // The first tick completes immediately, so liveness is known before the first interval.
        let mut ticker = time::interval(self.settings.interval.max(MIN_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::info!("Health monitor received shutdown signal, exiting loop");
                    break;
                }
                _ = ticker.tick() => {
                    self.check_all().await;
                }
            }
        }
    }

    async fn check_all(&self) {
        join_all(self.pool.iter().map(|backend| self.check(backend))).await;
    }

    async fn check(&self, backend: &Backend) {
        let outcome = self.probe(backend).await;
        let transition = state::apply(backend, &outcome);

        match (&outcome, transition) {
            (_, Transition::Recovered) => {
                tracing::info!(backend = %backend, "Backend is now healthy");
            }
            (ProbeOutcome::Unhealthy(failure), Transition::Failed) => {
                tracing::warn!(backend = %backend, reason = %failure, "Health check failed, marking backend dead");
            }
            (ProbeOutcome::Unhealthy(failure), _) => {
                tracing::debug!(backend = %backend, reason = %failure, "Health check failed");
            }
            (ProbeOutcome::Healthy, _) => {}
        }

        metrics::record_backend_health(backend.address(), backend.is_alive());
    }

    async fn probe(&self, backend: &Backend) -> ProbeOutcome {
        let request = match Request::builder()
            .method(Method::GET)
            .uri(probe_url(backend, &self.settings.path))
            .header(header::USER_AGENT, USER_AGENT)
            .body(Body::empty())
        {
            Ok(req) => req,
            Err(e) => return ProbeOutcome::Unhealthy(ProbeFailure::InvalidRequest(e.to_string())),
        };

        match time::timeout(self.settings.timeout, self.client.request(request)).await {
            Ok(Ok(response)) => ProbeOutcome::from_status(response.status()),
            Ok(Err(e)) => ProbeOutcome::Unhealthy(ProbeFailure::Connect(e.to_string())),
            Err(_) => ProbeOutcome::Unhealthy(ProbeFailure::Timeout(self.settings.timeout)),
        }
    }
}

/// Background health monitor for a backend pool.
pub struct HealthMonitor {
    prober: Arc<Prober>,
    running: Mutex<Option<Shutdown>>,
}

impl HealthMonitor {
    pub fn new(pool: BackendPool, settings: HealthSettings) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());

        Self {
            prober: Arc::new(Prober {
                pool,
                settings,
                client,
            }),
            running: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &HealthSettings {
        &self.prober.settings
    }

    /// Spawn the probe loop. Calling it while already running does nothing.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.is_some() {
            return;
        }

        let shutdown = Shutdown::new();
        tokio::spawn(self.prober.clone().run(shutdown.subscribe()));
        *running = Some(shutdown);
    }

    /// Stop scheduling new probe rounds. A round in progress is allowed to finish.
    pub fn stop(&self) {
        let stopped = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(shutdown) = stopped {
            shutdown.trigger();
            tracing::info!("Health monitor stopping");
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Probe every backend once and wait for all results.
    pub async fn check_all(&self) {
        self.prober.check_all().await;
    }
}

impl std::fmt::Debug for HealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthMonitor")
            .field("settings", &self.prober.settings)
            .field("running", &self.is_running())
            .finish()
    }
}
