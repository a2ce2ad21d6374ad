//! Weighted round-robin load balancing strategy.
//!
//! The pool is expanded once into a sequence where each backend appears
//! `weight` times, in pool order. Selection then rotates over that sequence
//! exactly like plain round-robin, so each alive backend receives
//! `weight / sum(weights)` of the traffic over a full cycle.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::load_balancer::{backend::Backend, pool::BackendPool, LoadBalancer};

/// Weighted round-robin selector.
#[derive(Debug)]
pub struct WeightedRoundRobin {
    pool: BackendPool,
    /// Pool indices, each repeated `weight` times.
    sequence: Vec<usize>,
    counter: AtomicUsize,
}

impl WeightedRoundRobin {
    pub fn new(pool: BackendPool) -> Self {
        let sequence = pool
            .iter()
            .enumerate()
            .flat_map(|(index, backend)| std::iter::repeat(index).take(backend.weight() as usize))
            .collect();

        Self {
            pool,
            sequence,
            counter: AtomicUsize::new(0),
        }
    }
}

impl LoadBalancer for WeightedRoundRobin {
    fn next_backend(&self) -> Option<Arc<Backend>> {
        let len = self.sequence.len();
        if len == 0 {
            return None;
        }

        for _ in 0..len {
            let slot = self.counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1) % len;
            let backend = &self.pool[self.sequence[slot]];
            if backend.is_alive() {
                return Some(backend.clone());
            }
        }
        None
    }

    fn name(&self) -> &'static str {
        "weighted"
    }
}
