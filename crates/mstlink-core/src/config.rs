//! Configuration surface consumed by the engine.
//!
//! Plain structs with defaults per source, plus `MSTLINK_*` environment
//! overrides for deployments that cannot ship a config file.

use std::env;
use std::time::Duration;

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::retry::RetryConfig;
use crate::rotator::{EndpointConfig, RotatorConfig};
use crate::{SourceId, ValidationError};

const MAX_CACHE_TTL: Duration = Duration::from_secs(3600);

/// Token-bucket parameters: `limit` tokens refilled evenly over `window`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub limit: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            limit: 5,
            window: Duration::from_secs(1),
        }
    }
}

/// Full per-source tuning block.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub source: SourceId,
    pub endpoints: Vec<EndpointConfig>,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
    pub breaker: CircuitBreakerConfig,
    pub rotator: RotatorConfig,
    pub cache_ttl: Duration,
    /// Per-attempt network timeout.
    pub attempt_timeout: Duration,
}

impl SourceConfig {
    pub fn registry_default() -> Self {
        Self {
            source: SourceId::Registry,
            endpoints: vec![EndpointConfig::direct(
                "https://thongtindoanhnghiep.co/api/company",
            )],
            rate_limit: RateLimitConfig::default(),
            retry: RetryConfig::default(),
            breaker: CircuitBreakerConfig::default(),
            rotator: RotatorConfig::default(),
            cache_ttl: Duration::from_secs(300),
            attempt_timeout: Duration::from_secs(10),
        }
    }

    /// The insurance endpoint is markedly less reliable than the registry,
    /// so it gets a longer cache TTL and one extra retry.
    pub fn insurance_default() -> Self {
        Self {
            source: SourceId::Insurance,
            endpoints: vec![EndpointConfig::direct("http://vssapp.teca.vn:8088")],
            rate_limit: RateLimitConfig {
                limit: 3,
                window: Duration::from_secs(1),
            },
            retry: RetryConfig::exponential(4),
            breaker: CircuitBreakerConfig::default(),
            rotator: RotatorConfig::default(),
            cache_ttl: Duration::from_secs(600),
            attempt_timeout: Duration::from_secs(15),
        }
    }

    pub fn default_for(source: SourceId) -> Self {
        match source {
            SourceId::Registry => Self::registry_default(),
            SourceId::Insurance => Self::insurance_default(),
        }
    }

    /// Apply `MSTLINK_*` environment overrides on top of the defaults.
    ///
    /// | Variable | Effect |
    /// |----------|--------|
    /// | `MSTLINK_REGISTRY_URL` / `MSTLINK_INSURANCE_URL` | replaces the direct endpoint |
    /// | `MSTLINK_PROXY_URLS` | comma-separated proxy mirrors appended as egress paths |
    /// | `MSTLINK_CACHE_TTL_SECS` | cache TTL, capped at 3600 |
    /// | `MSTLINK_MAX_RETRIES` | retry budget |
    /// | `MSTLINK_ATTEMPT_TIMEOUT_SECS` | per-attempt timeout |
    pub fn from_env(source: SourceId) -> Self {
        let mut config = Self::default_for(source);

        let url_var = match source {
            SourceId::Registry => "MSTLINK_REGISTRY_URL",
            SourceId::Insurance => "MSTLINK_INSURANCE_URL",
        };
        if let Ok(url) = env::var(url_var) {
            if !url.trim().is_empty() {
                config.endpoints = vec![EndpointConfig::direct(url.trim())];
            }
        }

        if let Ok(proxies) = env::var("MSTLINK_PROXY_URLS") {
            for (index, url) in proxies
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .enumerate()
            {
                config
                    .endpoints
                    .push(EndpointConfig::new(format!("proxy-{index}"), url));
            }
        }

        if let Some(secs) = env_u64("MSTLINK_CACHE_TTL_SECS") {
            config.cache_ttl = Duration::from_secs(secs).min(MAX_CACHE_TTL);
        }
        if let Some(retries) = env_u64("MSTLINK_MAX_RETRIES") {
            config.retry.max_retries = retries as u32;
        }
        if let Some(secs) = env_u64("MSTLINK_ATTEMPT_TIMEOUT_SECS") {
            config.attempt_timeout = Duration::from_secs(secs.max(1));
        }

        config
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.endpoints.is_empty() {
            return Err(ValidationError::EmptyEndpointList {
                source_name: self.source.as_str(),
            });
        }
        if self.rate_limit.limit == 0 {
            return Err(ValidationError::ZeroRateCapacity);
        }
        if self.rate_limit.window.is_zero() {
            return Err(ValidationError::ZeroRateWindow);
        }
        Ok(())
    }
}

/// Batch-level tuning: worker pool size, per-identifier deadline, output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    pub workers: usize,
    /// Overall deadline for one identifier, sized to absorb the slower
    /// source's full retry budget.
    pub deadline: Duration,
    /// When set, results are re-ordered by input index before being yielded.
    pub ordered_output: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            deadline: Duration::from_secs(45),
            ordered_output: false,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(workers) = env_u64("MSTLINK_MAX_WORKERS") {
            config.workers = (workers as usize).max(1);
        }
        if let Some(secs) = env_u64("MSTLINK_DEADLINE_SECS") {
            config.deadline = Duration::from_secs(secs.max(1));
        }
        config
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.workers == 0 {
            return Err(ValidationError::ZeroWorkers);
        }
        Ok(())
    }
}

fn env_u64(name: &str) -> Option<u64> {
    env::var(name).ok()?.trim().parse().ok()
}
