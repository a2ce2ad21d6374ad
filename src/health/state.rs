//! Backend health state machine.
//!
//! # States
//! - Alive: backend receives traffic (initial state)
//! - Dead: backend excluded from load balancing
//!
//! # State Transitions
//! ```text
//! Alive → Dead: any failed probe (connection error, timeout, non-2xx)
//! Dead → Alive: any successful probe (2xx)
//! ```
//!
//! # Design Decisions
//! - No hysteresis: a single probe flips state immediately
//! - State changes logged for observability

use std::fmt;
use std::time::Duration;

use axum::http::StatusCode;

use crate::load_balancer::backend::Backend;

/// Why a probe failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeFailure {
    /// The probe request could not be built.
    InvalidRequest(String),
    /// Connection or protocol error.
    Connect(String),
    /// No response within the probe timeout.
    Timeout(Duration),
    /// The backend answered with a non-2xx status.
    Status(StatusCode),
}

impl fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeFailure::InvalidRequest(e) => write!(f, "invalid probe request: {}", e),
            ProbeFailure::Connect(e) => write!(f, "connection error: {}", e),
            ProbeFailure::Timeout(t) => write!(f, "timed out after {:?}", t),
            ProbeFailure::Status(s) => write!(f, "non-success status {}", s),
        }
    }
}

/// Result of one liveness probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Healthy,
    Unhealthy(ProbeFailure),
}

impl ProbeOutcome {
    /// Classify a response status; only 2xx counts as healthy.
    pub fn from_status(status: StatusCode) -> Self {
        if status.is_success() {
            ProbeOutcome::Healthy
        } else {
            ProbeOutcome::Unhealthy(ProbeFailure::Status(status))
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, ProbeOutcome::Healthy)
    }
}

/// Effect of applying a probe outcome to a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Dead → Alive.
    Recovered,
    /// Alive → Dead.
    Failed,
    /// State did not change.
    Unchanged,
}

/// Apply a probe outcome to a backend's liveness flag.
pub fn apply(backend: &Backend, outcome: &ProbeOutcome) -> Transition {
    let alive = outcome.is_healthy();
    let was_alive = backend.set_alive(alive);
    match (was_alive, alive) {
        (false, true) => Transition::Recovered,
        (true, false) => Transition::Failed,
        _ => Transition::Unchanged,
    }
}
