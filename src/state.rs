//! # Application State
//!
//! Everything shared between HTTP workers lives in [`AppState`]. actix-web runs
//! one single-threaded runtime per worker and clones the `web::Data` handle into
//! each, so every field is either immutable behind an `Arc` or built for
//! concurrent mutation:
//!
//! - **config / pipeline**: read-only after startup, plain `Arc`
//! - **metrics**: atomics for the totals, a `DashMap` for per-endpoint stats
//! - **rate_limits**: the process-wide rate-limit store (also a `DashMap`)
//!
//! Nothing here takes a lock that could be poisoned, so none of the accessors
//! can fail.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;

use crate::config::AppConfig;
use crate::middleware::RateLimitStore;
use crate::pipeline::ConsultationPipeline;

/// Shared state handed to every handler through `web::Data<AppState>`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,

    /// Request counters fed by the metrics middleware
    pub metrics: Arc<HttpMetrics>,

    /// Fixed-window counters for the consultation endpoint. Owned here so it
    /// outlives the per-request middleware chains.
    pub rate_limits: Arc<RateLimitStore>,

    pub pipeline: Arc<ConsultationPipeline>,

    /// When the server started; used for uptime
    pub start_time: Instant,
}

/// Totals plus per-endpoint statistics.
///
/// Endpoint keys look like `"POST /api/v1/consultation"`.
#[derive(Debug, Default)]
pub struct HttpMetrics {
    request_count: AtomicU64,
    error_count: AtomicU64,
    endpoints: DashMap<String, EndpointMetric>,
}

/// Detailed performance metrics for a specific API endpoint.
///
/// ## Derived values:
/// - **Average response time**: total_duration_ms / request_count
/// - **Error rate**: error_count / request_count
#[derive(Debug, Default, Clone, PartialEq)]
pub struct EndpointMetric {
    pub request_count: u64,
    pub total_duration_ms: u64,
    pub error_count: u64,
}

/// Point-in-time copy of [`HttpMetrics`], safe to serialize without holding
/// any map shard.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub request_count: u64,
    pub error_count: u64,
    pub endpoints: Vec<(String, EndpointMetric)>,
}

impl MetricsSnapshot {
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

impl AppState {
    pub fn new(config: AppConfig, pipeline: ConsultationPipeline) -> Self {
        let rate_limits = RateLimitStore::new(config.rate_limit.max_tracked_clients);
        Self {
            config: Arc::new(config),
            metrics: Arc::new(HttpMetrics::default()),
            rate_limits: Arc::new(rate_limits),
            pipeline: Arc::new(pipeline),
            start_time: Instant::now(),
        }
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl HttpMetrics {
    pub fn increment_request_count(&self) {
        self.request_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Called for every 4xx/5xx response and for requests that failed before
    /// producing one.
    pub fn increment_error_count(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one finished request against its endpoint. The first time an
    /// endpoint is seen it starts from zeroed stats.
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metric = self.endpoints.entry(endpoint.to_string()).or_default();
        metric.request_count += 1;
        metric.total_duration_ms += duration_ms;
        if is_error {
            metric.error_count += 1;
        }
    }

    /// Snapshot with endpoints sorted by key so the output is stable.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let mut endpoints: Vec<(String, EndpointMetric)> = self
            .endpoints
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        endpoints.sort_by(|a, b| a.0.cmp(&b.0));

        MetricsSnapshot {
            request_count: self.request_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            endpoints,
        }
    }
}

impl EndpointMetric {
    /// Average response time in milliseconds; 0.0 before the first request.
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Fraction of requests that failed, between 0.0 and 1.0.
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_metrics_accumulate() {
        let metrics = HttpMetrics::default();
        metrics.record_endpoint_request("POST /api/v1/extract", 100, false);
        metrics.record_endpoint_request("POST /api/v1/extract", 300, true);
        metrics.record_endpoint_request("GET /health", 2, false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.endpoints.len(), 2);
        assert_eq!(snapshot.endpoints[0].0, "GET /health");

        let (_, extract) = &snapshot.endpoints[1];
        assert_eq!(extract.request_count, 2);
        assert_eq!(extract.average_duration_ms(), 200.0);
        assert_eq!(extract.error_rate(), 0.5);
    }

    #[test]
    fn test_totals_and_error_rate() {
        let metrics = HttpMetrics::default();
        assert_eq!(metrics.snapshot().error_rate(), 0.0);

        for _ in 0..4 {
            metrics.increment_request_count();
        }
        metrics.increment_error_count();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.request_count, 4);
        assert_eq!(snapshot.error_count, 1);
        assert_eq!(snapshot.error_rate(), 0.25);
    }

    #[test]
    fn test_empty_endpoint_metric() {
        let metric = EndpointMetric::default();
        assert_eq!(metric.average_duration_ms(), 0.0);
        assert_eq!(metric.error_rate(), 0.0);
    }
}
