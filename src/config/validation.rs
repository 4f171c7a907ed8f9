//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (capacity > 0, timeouts > 0)
//! - Check the metrics address parses when metrics are enabled
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: CoreConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::CoreConfig;

/// A single semantic configuration error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Pool capacity must be at least 1.
    ZeroCapacity,
    /// A timeout or deadline field was zero.
    ZeroDuration(&'static str),
    /// Metrics endpoint enabled but the address does not parse.
    InvalidMetricsAddress(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::ZeroCapacity => {
                write!(f, "pool.capacity must be greater than zero")
            }
            ValidationError::ZeroDuration(field) => {
                write!(f, "{} must be greater than zero", field)
            }
            ValidationError::InvalidMetricsAddress(addr) => {
                write!(f, "observability.metrics_address is not a socket address: {}", addr)
            }
        }
    }
}

/// Validate a parsed configuration, accumulating every error found.
pub fn validate_config(config: &CoreConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.pool.capacity == 0 {
        errors.push(ValidationError::ZeroCapacity);
    }
    if config.pool.acquire_timeout_ms == 0 {
        errors.push(ValidationError::ZeroDuration("pool.acquire_timeout_ms"));
    }
    if config.pool.idle_ttl_secs == 0 {
        errors.push(ValidationError::ZeroDuration("pool.idle_ttl_secs"));
    }
    if config.scheduler.request_deadline_ms == 0 {
        errors.push(ValidationError::ZeroDuration("scheduler.request_deadline_ms"));
    }
    if config.observability.metrics_enabled
        && config.observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
