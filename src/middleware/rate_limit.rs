//! Fixed-window rate limiting keyed by client address.
//!
//! The [`RateLimitStore`] lives in the application state for the whole
//! process; each chain gets a [`RateLimiter`] pointing at it. The store is
//! bounded: expired windows are purged on every check and, at capacity, the
//! client whose window resets first is evicted to make room.

use std::sync::Arc;
use std::time::Duration;

use actix_web::http::{
    header::{HeaderName, HeaderValue, RETRY_AFTER},
    StatusCode,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::json;
use tracing::{debug, warn};

use super::{ApiRequest, ApiResponse, Middleware, Next};
use crate::config::RateLimitConfig;

const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
const X_RATELIMIT_RESET: &str = "x-ratelimit-reset";

#[derive(Debug, Clone, Copy)]
pub struct RateLimitPolicy {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitPolicy {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.max_requests, Duration::from_millis(config.window_ms))
    }

    fn window_delta(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.window).unwrap_or(chrono::Duration::MAX)
    }
}

#[derive(Debug, Clone, Copy)]
struct ClientWindow {
    count: u32,
    reset_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    Allowed {
        limit: u32,
        remaining: u32,
        reset_at: DateTime<Utc>,
    },
    Limited {
        limit: u32,
        retry_after_secs: u64,
        reset_at: DateTime<Utc>,
    },
}

pub struct RateLimitStore {
    clients: DashMap<String, ClientWindow>,
    max_tracked_clients: usize,
}

impl RateLimitStore {
    pub fn new(max_tracked_clients: usize) -> Self {
        Self {
            clients: DashMap::new(),
            max_tracked_clients: max_tracked_clients.max(1),
        }
    }

    pub fn check(&self, client: &str, policy: &RateLimitPolicy) -> RateLimitDecision {
        self.check_at(client, policy, Utc::now())
    }

    /// Count one request from `client` at `now`.
    pub fn check_at(
        &self,
        client: &str,
        policy: &RateLimitPolicy,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        self.clients.retain(|_, window| now <= window.reset_at);

        if !self.clients.contains_key(client) && self.clients.len() >= self.max_tracked_clients {
            self.evict_earliest();
        }

        let mut window = self
            .clients
            .entry(client.to_string())
            .or_insert_with(|| ClientWindow {
                count: 0,
                reset_at: now
                    .checked_add_signed(policy.window_delta())
                    .unwrap_or(DateTime::<Utc>::MAX_UTC),
            });

        if window.count >= policy.max_requests {
            let millis = (window.reset_at - now).num_milliseconds().max(0) as u64;
            return RateLimitDecision::Limited {
                limit: policy.max_requests,
                retry_after_secs: millis.div_ceil(1000),
                reset_at: window.reset_at,
            };
        }

        window.count += 1;
        RateLimitDecision::Allowed {
            limit: policy.max_requests,
            remaining: policy.max_requests - window.count,
            reset_at: window.reset_at,
        }
    }

    fn evict_earliest(&self) {
        let oldest = self
            .clients
            .iter()
            .min_by_key(|entry| entry.value().reset_at)
            .map(|entry| entry.key().clone());

        if let Some(key) = oldest {
            debug!(client = %key, "Evicting rate limit entry at capacity");
            self.clients.remove(&key);
        }
    }

    pub fn tracked_clients(&self) -> usize {
        self.clients.len()
    }

    pub fn capacity(&self) -> usize {
        self.max_tracked_clients
    }
}

/// Chain link that consults a shared [`RateLimitStore`].
pub struct RateLimiter {
    store: Arc<RateLimitStore>,
    policy: RateLimitPolicy,
}

impl RateLimiter {
    pub fn new(store: Arc<RateLimitStore>, policy: RateLimitPolicy) -> Self {
        Self { store, policy }
    }
}

#[async_trait(?Send)]
impl Middleware for RateLimiter {
    async fn handle(&self, req: &mut ApiRequest, next: Next<'_>) -> ApiResponse {
        let client = req.client_key().to_string();

        match self.store.check(&client, &self.policy) {
            RateLimitDecision::Limited {
                limit,
                retry_after_secs,
                reset_at,
            } => {
                warn!(
                    client = %client,
                    request_id = %req.request_id(),
                    retry_after = retry_after_secs,
                    "Rate limit exceeded"
                );
                let mut response = ApiResponse::json(
                    StatusCode::TOO_MANY_REQUESTS,
                    json!({
                        "success": false,
                        "error": "Rate limit exceeded",
                        "retryAfter": retry_after_secs,
                        "timestamp": Utc::now().to_rfc3339(),
                    }),
                );
                set_limit_headers(&mut response, limit, 0, reset_at);
                response.insert_header(RETRY_AFTER, HeaderValue::from(retry_after_secs));
                response
            }
            RateLimitDecision::Allowed {
                limit,
                remaining,
                reset_at,
            } => {
                let mut response = next.run(req).await;
                set_limit_headers(&mut response, limit, remaining, reset_at);
                response
            }
        }
    }
}

fn set_limit_headers(
    response: &mut ApiResponse,
    limit: u32,
    remaining: u32,
    reset_at: DateTime<Utc>,
) {
    response.insert_header(
        HeaderName::from_static(X_RATELIMIT_LIMIT),
        HeaderValue::from(limit),
    );
    response.insert_header(
        HeaderName::from_static(X_RATELIMIT_REMAINING),
        HeaderValue::from(remaining),
    );
    if let Ok(value) = HeaderValue::from_str(&reset_at.to_rfc3339()) {
        response.insert_header(HeaderName::from_static(X_RATELIMIT_RESET), value);
    }
}
