//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Request arrives at the routing pipeline
//!     → LoadBalancer::next_backend()
//!         - round_robin.rs (rotate through backends)
//!         - least_conn.rs (pick backend with fewest connections)
//!         - weighted.rs (rotate through a weight-expanded sequence)
//!     → backend.rs (connection guard held while forwarding)
//!     → None when no backend is alive
//! ```
//!
//! # Design Decisions
//! - The pool is fixed at startup; strategies hold a shared handle to it
//! - Strategy cursors are private to each strategy instance
//! - Dead backends are skipped; at most one pass over the pool per call
//! - Algorithm chosen once from a validated enum, never from raw strings at request time

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use thiserror::Error;

pub mod backend;
pub mod least_conn;
pub mod pool;
pub mod round_robin;
pub mod weighted;

use backend::Backend;
use least_conn::LeastConnections;
use pool::BackendPool;
use round_robin::RoundRobin;
use weighted::WeightedRoundRobin;

/// Selects the next backend for a request.
pub trait LoadBalancer: Send + Sync + fmt::Debug {
    /// Return an alive backend, or `None` if every backend is dead.
    fn next_backend(&self) -> Option<Arc<Backend>>;

    /// Algorithm name for logs.
    fn name(&self) -> &'static str;
}

/// The supported load balancing algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Algorithm {
    #[default]
    RoundRobin,
    LeastConnections,
    Weighted,
}

#[derive(Debug, Error)]
#[error("unknown load balancing algorithm: {0}")]
pub struct UnknownAlgorithm(pub String);

impl Algorithm {
    /// Resolve an algorithm by name, falling back to round-robin.
    pub fn from_name(name: &str) -> Self {
        name.parse().unwrap_or_else(|_| {
            tracing::warn!(algorithm = %name, "Unknown load balancing algorithm, using round-robin");
            Algorithm::RoundRobin
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Algorithm::RoundRobin => "round-robin",
            Algorithm::LeastConnections => "least-connections",
            Algorithm::Weighted => "weighted",
        }
    }

    /// Build the strategy over the given pool.
    pub fn build(self, pool: BackendPool) -> Box<dyn LoadBalancer> {
        match self {
            Algorithm::RoundRobin => Box::new(RoundRobin::new(pool)),
            Algorithm::LeastConnections => Box::new(LeastConnections::new(pool)),
            Algorithm::Weighted => Box::new(WeightedRoundRobin::new(pool)),
        }
    }
}

impl FromStr for Algorithm {
    type Err = UnknownAlgorithm;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "round-robin" => Ok(Algorithm::RoundRobin),
            "least-connections" => Ok(Algorithm::LeastConnections),
            "weighted" => Ok(Algorithm::Weighted),
            other => Err(UnknownAlgorithm(other.to_string())),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use super::test_support::pool;

    #[test]
    fn test_algorithm_names() {
        assert_eq!("round-robin".parse::<Algorithm>().unwrap(), Algorithm::RoundRobin);
        assert_eq!(
            "least-connections".parse::<Algorithm>().unwrap(),
            Algorithm::LeastConnections
        );
        assert_eq!("weighted".parse::<Algorithm>().unwrap(), Algorithm::Weighted);
        assert!("random".parse::<Algorithm>().is_err());
    }

    #[test]
    fn test_unknown_name_defaults_to_round_robin() {
        assert_eq!(Algorithm::from_name("fastest"), Algorithm::RoundRobin);
        assert_eq!(Algorithm::from_name(""), Algorithm::RoundRobin);
        assert_eq!(Algorithm::from_name("weighted"), Algorithm::Weighted);
    }

    #[test]
    fn test_build_matches_algorithm() {
        for algorithm in [
            Algorithm::RoundRobin,
            Algorithm::LeastConnections,
            Algorithm::Weighted,
        ] {
            assert_eq!(algorithm.build(pool(2)).name(), algorithm.as_str());
        }
    }

    #[test]
    fn test_all_dead_returns_none_for_every_algorithm() {
        for algorithm in [
            Algorithm::RoundRobin,
            Algorithm::LeastConnections,
            Algorithm::Weighted,
        ] {
            let pool = pool(3);
            for b in pool.iter() {
                b.set_alive(false);
            }
            let lb = algorithm.build(pool.clone());
            for _ in 0..10 {
                assert!(lb.next_backend().is_none(), "{} returned a dead backend", algorithm);
            }
        }
    }
}
