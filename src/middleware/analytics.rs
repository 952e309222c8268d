//! # Request Analytics
//!
//! Second link of every chain, right after CORS:
//! 1. Assign a request id (`req_<unix millis>_<9 random characters>`)
//! 2. Log "Request started" with the endpoint and method
//! 3. After the rest of the chain returns, log "Request completed" with the
//!    status and latency
//! 4. Merge `metadata` (latency, timestamp, request id, status) into successful
//!    JSON bodies; error envelopes are left as they are

use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use super::context::{RequestMetadata, ResponseMetadata};
use super::{ApiRequest, ApiResponse, Middleware, Next};

/// Assigns the request id, logs entry and exit, and merges latency metadata
/// into successful JSON responses.
pub struct Analytics;

/// `req_<unix millis>_<9 random characters>`
pub fn generate_request_id() -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("req_{}_{}", Utc::now().timestamp_millis(), &random[..9])
}

#[async_trait(?Send)]
impl Middleware for Analytics {
    async fn handle(&self, req: &mut ApiRequest, next: Next<'_>) -> ApiResponse {
        let metadata = RequestMetadata {
            request_id: generate_request_id(),
            start_time: Utc::now(),
            started_at: Instant::now(),
            endpoint: req.path.clone(),
            method: req.method.to_string(),
        };

        info!(
            request_id = %metadata.request_id,
            endpoint = %metadata.endpoint,
            method = %metadata.method,
            timestamp = %metadata.start_time.to_rfc3339(),
            "Request started"
        );

        let request_id = metadata.request_id.clone();
        let started_at = metadata.started_at;
        req.metadata = Some(metadata);

        let mut response = next.run(req).await;

        let latency = started_at.elapsed().as_millis() as u64;
        let status = response.status().as_u16();

        info!(
            request_id = %request_id,
            endpoint = %req.path,
            method = %req.method,
            status,
            latency_ms = latency,
            "Request completed"
        );

        response.attach_metadata(&ResponseMetadata {
            latency,
            timestamp: Utc::now().to_rfc3339(),
            request_id,
            status,
        });
        response
    }
}
