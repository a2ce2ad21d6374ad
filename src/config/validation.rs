//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate backend addresses and weights
//! - Validate value ranges (timeouts > 0, addresses parse)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::load_balancer::backend::parse_backend_url;
use crate::load_balancer::Algorithm;

/// Upper bound on a backend weight; weighted selection expands the pool by weight.
pub const MAX_WEIGHT: i64 = 1000;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener bind_address {0:?} is not a valid socket address")]
    InvalidBindAddress(String),

    #[error("at least one backend is required")]
    NoBackends,

    #[error("backend {index}: address is required")]
    EmptyBackendAddress { index: usize },

    #[error("backend {index}: invalid address {address:?}: {reason}")]
    InvalidBackendAddress {
        index: usize,
        address: String,
        reason: String,
    },

    #[error("backend {index}: unsupported scheme {scheme:?} (only http is supported)")]
    UnsupportedScheme { index: usize, scheme: String },

    #[error("backend {index}: weight must be non-negative (got {weight})")]
    NegativeWeight { index: usize, weight: i64 },

    #[error("backend {index}: weight must be at most 1000 (got {weight})")]
    WeightTooLarge { index: usize, weight: i64 },

    #[error("invalid load balancer algorithm {0:?} (must be one of: round-robin, least-connections, weighted)")]
    UnknownAlgorithm(String),

    #[error("health_check interval_secs must be greater than zero")]
    ZeroHealthInterval,

    #[error("health_check timeout_secs must be greater than zero")]
    ZeroHealthTimeout,

    #[error("health_check path {0:?} must start with '/'")]
    InvalidHealthPath(String),

    #[error("timeouts request_secs must be greater than zero")]
    ZeroRequestTimeout,

    #[error("timeouts read_secs must be greater than zero")]
    ZeroReadTimeout,

    #[error("timeouts write_secs must be greater than zero")]
    ZeroWriteTimeout,

    #[error("invalid log level {0:?} (must be one of: trace, debug, info, warn, error)")]
    InvalidLogLevel(String),

    #[error("metrics_address {0:?} is not a valid socket address")]
    InvalidMetricsAddress(String),
}

/// Validate a deserialized configuration, collecting every error.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidBindAddress(
            config.listener.bind_address.clone(),
        ));
    }

    if config.backends.is_empty() {
        errors.push(ValidationError::NoBackends);
    }

    for (index, backend) in config.backends.iter().enumerate() {
        if backend.address.trim().is_empty() {
            errors.push(ValidationError::EmptyBackendAddress { index });
        } else {
            match parse_backend_url(&backend.address) {
                Ok(url) if url.scheme() != "http" => {
                    errors.push(ValidationError::UnsupportedScheme {
                        index,
                        scheme: url.scheme().to_string(),
                    });
                }
                Ok(_) => {}
                Err(e) => errors.push(ValidationError::InvalidBackendAddress {
                    index,
                    address: backend.address.clone(),
                    reason: e.to_string(),
                }),
            }
        }

        if backend.weight < 0 {
            errors.push(ValidationError::NegativeWeight {
                index,
                weight: backend.weight,
            });
        } else if backend.weight > MAX_WEIGHT {
            errors.push(ValidationError::WeightTooLarge {
                index,
                weight: backend.weight,
            });
        }
    }

    if config.load_balancer.algorithm.parse::<Algorithm>().is_err() {
        errors.push(ValidationError::UnknownAlgorithm(
            config.load_balancer.algorithm.clone(),
        ));
    }

    let health = &config.health_check;
    if health.enabled {
        if health.interval_secs == 0 {
            errors.push(ValidationError::ZeroHealthInterval);
        }
        if health.timeout_secs == 0 {
            errors.push(ValidationError::ZeroHealthTimeout);
        }
        if !health.path.starts_with('/') {
            errors.push(ValidationError::InvalidHealthPath(health.path.clone()));
        }
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }
    if config.timeouts.read_secs == 0 {
        errors.push(ValidationError::ZeroReadTimeout);
    }
    if config.timeouts.write_secs == 0 {
        errors.push(ValidationError::ZeroWriteTimeout);
    }

    let observability = &config.observability;
    if !LOG_LEVELS.contains(&observability.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::InvalidLogLevel(
            observability.log_level.clone(),
        ));
    }
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
