//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Routing pipeline and health monitor produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → Log aggregation (stdout, text or JSON)
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Request ID attached by the HTTP layer and visible in trace spans
//! - Metrics are cheap (atomic increments)

pub mod logging;
pub mod metrics;
