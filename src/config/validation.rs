//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate addresses and the origin URL
//! - Validate value ranges (rate, burst, intervals > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use url::Url;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("listener.bind_address {0:?} is not a socket address")]
    BindAddress(String),

    #[error("origin.url {url:?} is invalid: {reason}")]
    OriginUrl { url: String, reason: String },

    #[error("origin.timeout_secs must be greater than zero")]
    OriginTimeout,

    #[error("rate_limit.requests_per_second must be positive (got {0})")]
    Rate(f64),

    #[error("rate_limit.burst_size must be positive")]
    Burst,

    #[error("rate_limit.cleanup_interval_secs must be greater than zero")]
    CleanupInterval,

    #[error("observability.metrics_address {0:?} is not a socket address")]
    MetricsAddress(String),
}

/// Check a configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }

    if let Err(reason) = check_origin_url(&config.origin.url) {
        errors.push(ValidationError::OriginUrl {
            url: config.origin.url.clone(),
            reason,
        });
    }

    if config.origin.timeout_secs == 0 {
        errors.push(ValidationError::OriginTimeout);
    }

    let rl = &config.rate_limit;
    if rl.enabled {
        if !(rl.requests_per_second > 0.0 && rl.requests_per_second.is_finite()) {
            errors.push(ValidationError::Rate(rl.requests_per_second));
        }
        if rl.burst_size == 0 {
            errors.push(ValidationError::Burst);
        }
        if rl.cleanup_interval_secs == 0 {
            errors.push(ValidationError::CleanupInterval);
        }
    }

    let obs = &config.observability;
    if obs.metrics_enabled && obs.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::MetricsAddress(obs.metrics_address.clone()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_origin_url(raw: &str) -> Result<(), String> {
    let url = Url::parse(raw).map_err(|e| e.to_string())?;
    if url.scheme() != "http" {
        return Err(format!("unsupported scheme {:?}, only http is supported", url.scheme()));
    }
    if url.host_str().is_none() {
        return Err("missing host".to_string());
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err("must not carry a query or fragment".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert_eq!(validate_config(&ProxyConfig::default()), Ok(()));
    }

    #[test]
    fn collects_all_errors() {
        let mut config = ProxyConfig::default();
        config.listener.bind_address = "not-an-address".into();
        config.origin.url = "https://origin.example".into();
        config.rate_limit.requests_per_second = 0.0;
        config.rate_limit.burst_size = 0;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4);
        assert!(errors.contains(&ValidationError::Burst));
        assert!(errors.contains(&ValidationError::Rate(0.0)));
    }

    #[test]
    fn limiter_values_ignored_when_disabled() {
        let mut config = ProxyConfig::default();
        config.rate_limit.enabled = false;
        config.rate_limit.burst_size = 0;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn origin_url_rules() {
        assert!(check_origin_url("http://127.0.0.1:3000").is_ok());
        assert!(check_origin_url("http://origin.internal/api/").is_ok());
        assert!(check_origin_url("http://origin.internal/?a=1").is_err());
        assert!(check_origin_url("ftp://origin.internal").is_err());
        assert!(check_origin_url("origin.internal").is_err());
    }
}
