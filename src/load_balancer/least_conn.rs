//! Least Connections load balancing strategy.

use std::sync::Arc;

use crate::load_balancer::{backend::Backend, pool::BackendPool, LoadBalancer};

/// Least connections selector.
/// Selects the alive backend with the minimum number of active connections.
#[derive(Debug)]
pub struct LeastConnections {
    pool: BackendPool,
}

impl LeastConnections {
    pub fn new(pool: BackendPool) -> Self {
        Self { pool }
    }
}

impl LoadBalancer for LeastConnections {
    fn next_backend(&self) -> Option<Arc<Backend>> {
        // In case of tie, the first one is selected (stability)
        self.pool
            .iter()
            .filter(|b| b.is_alive())
            .min_by_key(|b| b.connections())
            .cloned()
    }

    fn name(&self) -> &'static str {
        "least-connections"
    }
}
