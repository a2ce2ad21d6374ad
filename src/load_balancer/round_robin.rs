//! Round-robin load balancing strategy.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::load_balancer::{backend::Backend, pool::BackendPool, LoadBalancer};

/// Round-robin selector.
/// Stores an internal counter to rotate through backends.
#[derive(Debug)]
pub struct RoundRobin {
    pool: BackendPool,
    counter: AtomicUsize,
}

impl RoundRobin {
    pub fn new(pool: BackendPool) -> Self {
        Self {
            pool,
            counter: AtomicUsize::new(0),
        }
    }
}

impl LoadBalancer for RoundRobin {
    fn next_backend(&self) -> Option<Arc<Backend>> {
        let len = self.pool.len();
        if len == 0 {
            return None;
        }

        // Every attempt advances the shared cursor; bounded so an all-dead pool terminates.
        for _ in 0..len {
            let index = self.counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1) % len;
            let backend = &self.pool[index];
            if backend.is_alive() {
                return Some(backend.clone());
            }
        }
        None
    }

    fn name(&self) -> &'static str {
        "round-robin"
    }
}
