//! # Mstlink Core
//!
//! Resilient enrichment engine for Vietnamese enterprise tax identifiers
//! (MST). Each identifier is queried against two public upstreams, the
//! enterprise registry and the social-insurance system, and the answers are
//! merged into one validated record with provenance and quality scores.
//!
//! ## Overview
//!
//! The engine is built from small, independently testable parts:
//!
//! - **Identifier normalization** for the 10/13-digit MST formats
//! - **Source clients** wrapping each upstream behind a shared resilience
//!   stack (rate gate, endpoint rotation, circuit breaker, response cache,
//!   retry with backoff)
//! - **Merge & validation engine** producing scored, provenance-tagged records
//! - **Orchestrator** that queries both sources concurrently under a deadline
//! - **Batch scheduler** fanning identifier lists across a worker pool
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`cache`] | TTL response cache for terminal source outcomes |
//! | [`circuit_breaker`] | Per-source circuit breaker with single-probe recovery |
//! | [`clients`] | Registry and insurance clients plus the shared stack |
//! | [`config`] | Per-source and pipeline tuning, `MSTLINK_*` env overrides |
//! | [`domain`] | Identifier type, outcomes, and the output field catalog |
//! | [`error`] | Core error types |
//! | [`http_client`] | HTTP client abstraction |
//! | [`merge`] | Field merging, validation findings, and scoring |
//! | [`orchestrator`] | Per-identifier concurrent fetch and merge |
//! | [`retry`] | Retry budget and backoff policies |
//! | [`rotator`] | Health-scored egress path rotation |
//! | [`scheduler`] | Batch worker pool and run metrics |
//! | [`source`] | Upstream source identifiers |
//! | [`throttling`] | Token-bucket rate gate |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mstlink_core::{
//!     InsuranceClient, MergePolicy, Orchestrator, RegistryClient, ReqwestHttpClient,
//!     ResponseCache, SourceConfig, SourceId,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), mstlink_core::ValidationError> {
//!     let http = Arc::new(ReqwestHttpClient::new());
//!     let cache = ResponseCache::with_default_ttl();
//!
//!     let registry = SourceConfig::from_env(SourceId::Registry);
//!     let insurance = SourceConfig::from_env(SourceId::Insurance);
//!     let orchestrator = Orchestrator::new(
//!         Arc::new(RegistryClient::new(&registry, http.clone(), cache.clone())?),
//!         Arc::new(InsuranceClient::new(&insurance, http, cache)?),
//!         MergePolicy::default(),
//!         std::time::Duration::from_secs(45),
//!     );
//!
//!     let record = orchestrator.enrich("110198560").await;
//!     println!("{} -> {}", record.mst, record.status);
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Fetch paths never return errors: every expected failure mode is encoded
//! in the [`SourceOutcome`] of the returned result, and merge-level issues
//! surface as [`Finding`]s on the record. `Result` is reserved for
//! construction and configuration validation.

pub mod cache;
pub mod circuit_breaker;
pub mod clients;
pub mod config;
pub mod domain;
pub mod error;
pub mod http_client;
pub mod merge;
pub mod orchestrator;
pub mod retry;
pub mod rotator;
pub mod scheduler;
pub mod source;
pub mod throttling;

// Re-export commonly used types at crate root for convenience

// Source clients
pub use clients::{InsuranceClient, RegistryClient, SourceClient, SourceStack};

// Circuit breaker
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

// Caching
pub use cache::ResponseCache;

// Configuration
pub use config::{PipelineConfig, RateLimitConfig, SourceConfig};

// Domain types
pub use domain::{
    field_spec, FieldCategory, FieldMap, FieldSpec, Mst, SourceOutcome, SourceResult,
    EXPECTED_FIELDS,
};

// Error types
pub use error::{CoreError, ValidationError};

// HTTP client types
pub use http_client::{
    HttpClient, HttpError, HttpMethod, HttpRequest, HttpResponse, NoopHttpClient,
    ReqwestHttpClient,
};

// Merge engine
pub use merge::{
    merge, FieldEntry, Finding, MergePolicy, MergedRecord, Provenance, RecordStatus, Severity,
    SourceSummary,
};

// Orchestration and batch scheduling
pub use orchestrator::Orchestrator;
pub use scheduler::{BatchReport, BatchScheduler, MetricsSnapshot, RunMetrics};

// Resilience primitives
pub use retry::{Backoff, RetryConfig};
pub use rotator::{EndpointConfig, EndpointHandle, EndpointRotator, RotatorConfig};
pub use source::SourceId;
pub use throttling::RateGate;
