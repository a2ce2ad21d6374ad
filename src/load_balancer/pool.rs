//! Backend pool management.
//!
//! # Responsibilities
//! - Own the fixed, ordered set of backends built from configuration
//! - Share it between the load balancer and the health monitor

use std::ops::Deref;
use std::sync::Arc;

use thiserror::Error;

use crate::config::BackendConfig;
use crate::load_balancer::backend::{parse_backend_url, Backend};

/// Error building a backend pool.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("no backends configured")]
    Empty,

    #[error("invalid backend address {address}: {source}")]
    InvalidAddress {
        address: String,
        #[source]
        source: url::ParseError,
    },
}

/// The fixed, ordered set of backends.
///
/// Cloning is cheap and every clone sees the same backend records.
#[derive(Debug, Clone)]
pub struct BackendPool {
    backends: Arc<[Arc<Backend>]>,
}

impl BackendPool {
    /// Create a pool from already-built backends.
    pub fn new(backends: Vec<Backend>) -> Result<Self, PoolError> {
        if backends.is_empty() {
            return Err(PoolError::Empty);
        }
        Ok(Self {
            backends: backends.into_iter().map(Arc::new).collect(),
        })
    }

    /// Create a pool from configuration, preserving order.
    pub fn from_configs(configs: &[BackendConfig]) -> Result<Self, PoolError> {
        let backends = configs
            .iter()
            .map(|config| {
                let url = parse_backend_url(&config.address).map_err(|source| {
                    PoolError::InvalidAddress {
                        address: config.address.clone(),
                        source,
                    }
                })?;
                // Non-positive weights count as 1 so no backend is starved.
                let weight = u32::try_from(config.weight).unwrap_or(1);
                Ok(Backend::new(url, weight))
            })
            .collect::<Result<Vec<_>, PoolError>>()?;

        Self::new(backends)
    }

    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    /// Number of backends currently marked alive.
    pub fn alive_count(&self) -> usize {
        self.backends.iter().filter(|b| b.is_alive()).count()
    }
}

impl Deref for BackendPool {
    type Target = [Arc<Backend>];
    fn deref(&self) -> &Self::Target {
        &self.backends
    }
}
