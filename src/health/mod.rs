//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Active health checks (active.rs):
//!     Immediate first round, then periodic timer
//!     → Probe each backend concurrently (GET <address><path>, bounded timeout)
//!     → state.rs applies the outcome to the backend's alive flag
//! ```
//!
//! # Design Decisions
//! - Health state is per-backend, stored in the backend record itself
//! - The monitor only writes liveness; the load balancer only reads it
//! - Probe failures never propagate; they only mark the backend dead

pub mod active;
pub mod state;

pub use active::{HealthMonitor, HealthSettings};
