//! Source clients: one logical "fetch record for identifier" per upstream.
//!
//! Both clients share the same capability contract ([`SourceClient`]) and the
//! same resilience composition ([`SourceStack`]): rate gate, endpoint
//! rotator, circuit breaker, response cache, and a bounded retry loop with
//! exponential backoff. They differ only in URL shape and body parsing.

mod insurance;
mod registry;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::cache::ResponseCache;
use crate::circuit_breaker::CircuitBreaker;
use crate::config::SourceConfig;
use crate::domain::{FieldMap, Mst, SourceResult};
use crate::http_client::{HttpClient, HttpRequest};
use crate::retry::RetryConfig;
use crate::rotator::EndpointRotator;
use crate::throttling::RateGate;
use crate::{SourceId, ValidationError};

pub use insurance::InsuranceClient;
pub use registry::RegistryClient;

/// Capability contract shared by the registry and insurance clients.
///
/// `fetch` never fails: every expected failure mode is encoded in the
/// returned [`SourceResult`] outcome.
pub trait SourceClient: Send + Sync {
    fn id(&self) -> SourceId;

    fn fetch<'a>(
        &'a self,
        raw: &'a str,
    ) -> Pin<Box<dyn Future<Output = SourceResult> + Send + 'a>>;
}

/// Resilience composition behind one source client.
///
/// Rate gate, breaker, and rotator are one-per-source; the cache is shared
/// process-wide and keyed by (source, identifier). All pieces are explicitly
/// constructed and injectable so tests can substitute fakes and independent
/// pipelines can coexist.
pub struct SourceStack {
    source: SourceId,
    gate: RateGate,
    breaker: CircuitBreaker,
    rotator: EndpointRotator,
    cache: ResponseCache,
    retry: RetryConfig,
    attempt_timeout: Duration,
    cache_ttl: Duration,
    http: Arc<dyn HttpClient>,
}

impl std::fmt::Debug for SourceStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceStack")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl SourceStack {
    /// Validates the config up front so a malformed one (say, an empty
    /// endpoint list) is a construction error, never a panic at fetch time.
    pub fn new(
        config: &SourceConfig,
        http: Arc<dyn HttpClient>,
        cache: ResponseCache,
    ) -> Result<Self, ValidationError> {
        config.validate()?;
        Ok(Self {
            source: config.source,
            gate: RateGate::new(config.rate_limit.limit, config.rate_limit.window),
            breaker: CircuitBreaker::new(config.breaker),
            rotator: EndpointRotator::new(config.endpoints.clone(), config.rotator),
            cache,
            retry: config.retry.clone(),
            attempt_timeout: config.attempt_timeout,
            cache_ttl: config.cache_ttl,
            http,
        })
    }

    pub const fn source(&self) -> SourceId {
        self.source
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// One logical fetch: normalize, consult cache and breaker, then attempt
    /// the network up to the retry budget.
    ///
    /// `build_url` renders the per-endpoint request URL; `parse` maps a
    /// response body to the canonical field map. An empty parsed map is
    /// treated as "source has no record".
    pub async fn fetch<U, P>(&self, raw: &str, build_url: U, parse: P) -> SourceResult
    where
        U: Fn(&str, &Mst) -> String,
        P: Fn(&str) -> Result<FieldMap, String>,
    {
        let mst = match Mst::parse(raw) {
            Ok(mst) => mst,
            Err(err) => return SourceResult::invalid(self.source, err.to_string()),
        };

        if let Some(cached) = self.cache.get(self.source, &mst).await {
            debug!(source = %self.source, mst = %mst, "cache hit");
            return cached.into_cache_hit();
        }

        if !self.breaker.allow_request() {
            return SourceResult::circuit_open(self.source);
        }

        let started = Instant::now();
        let mut last_error = String::from("no attempt made");

        for attempt in 0..self.retry.total_attempts() {
            if attempt > 0 {
                tokio::time::sleep(self.retry.delay_for_attempt(attempt - 1)).await;
            }

            self.gate.acquire_ready().await;
            let endpoint = self.rotator.select();
            let url = build_url(&endpoint.base_url, &mst);
            let request = HttpRequest::get(url)
                .with_header("accept", "application/json")
                .with_timeout_ms(self.attempt_timeout.as_millis() as u64);

            let response = match self.http.execute(request).await {
                Ok(response) => response,
                Err(err) => {
                    warn!(
                        source = %self.source,
                        endpoint = %endpoint.label,
                        attempt,
                        timed_out = err.timed_out(),
                        error = %err,
                        "transport failure"
                    );
                    self.rotator.report(&endpoint, false);
                    self.breaker.record_failure();
                    last_error = if err.timed_out() {
                        format!("attempt timed out: {err}")
                    } else {
                        err.to_string()
                    };
                    continue;
                }
            };

            if response.status == 404 {
                // A definite "no record" answer means the source is healthy.
                self.rotator.report(&endpoint, true);
                self.breaker.record_success();
                let result = SourceResult::not_found(self.source, started.elapsed(), attempt + 1);
                self.cache
                    .put(mst.clone(), result.clone(), Some(self.cache_ttl))
                    .await;
                return result;
            }

            if !response.is_success() {
                self.rotator.report(&endpoint, false);
                self.breaker.record_failure();
                last_error = format!("unexpected status {}", response.status);
                if !self.retry.should_retry_status(response.status) {
                    debug!(
                        source = %self.source,
                        status = response.status,
                        "non-retryable status, still capped by attempt budget"
                    );
                }
                continue;
            }

            match parse(&response.body) {
                Ok(fields) if fields.is_empty() => {
                    self.rotator.report(&endpoint, true);
                    self.breaker.record_success();
                    let result =
                        SourceResult::not_found(self.source, started.elapsed(), attempt + 1);
                    self.cache
                        .put(mst.clone(), result.clone(), Some(self.cache_ttl))
                        .await;
                    return result;
                }
                Ok(fields) => {
                    self.rotator.report(&endpoint, true);
                    self.breaker.record_success();
                    let result =
                        SourceResult::success(self.source, fields, started.elapsed(), attempt + 1);
                    self.cache
                        .put(mst.clone(), result.clone(), Some(self.cache_ttl))
                        .await;
                    return result;
                }
                Err(reason) => {
                    // Malformed body: the path worked, the payload did not.
                    // Treated as transient, capped by the same budget.
                    self.rotator.report(&endpoint, true);
                    self.breaker.record_failure();
                    last_error = format!("malformed response: {reason}");
                    continue;
                }
            }
        }

        SourceResult::transient_failure(
            self.source,
            last_error,
            started.elapsed(),
            self.retry.total_attempts(),
        )
    }
}
