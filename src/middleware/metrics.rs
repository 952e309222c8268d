//! App-wide HTTP metrics.
//!
//! Requests are counted under `"METHOD route-pattern"`. The key space is fixed
//! by the route table: paths that match no route share the `unmatched` bucket
//! and non-standard methods are counted as `OTHER`.

use crate::state::AppState;
use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::Method,
    web, Error,
};
use futures_util::future::LocalBoxFuture;
use std::{
    future::{ready, Ready},
    sync::Arc,
    time::Instant,
};

/// Bucket for requests that match no route.
pub const UNMATCHED: &str = "unmatched";

/// App-wide request counter. Every request, including the browser client and
/// health checks, is counted.
pub struct MetricsMiddleware;

impl<S, B> Transform<S, ServiceRequest> for MetricsMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = MetricsMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(MetricsMiddlewareService { service }))
    }
}

pub struct MetricsMiddlewareService<S> {
    service: S,
}

impl<S, B> Service<ServiceRequest> for MetricsMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let start_time = Instant::now();
        let endpoint = endpoint_key(&req);

        // Grab the metrics handle up front; an `Err` result carries no request
        // to look it up from afterwards.
        let metrics = req
            .app_data::<web::Data<AppState>>()
            .map(|state| Arc::clone(&state.metrics));

        if let Some(metrics) = &metrics {
            metrics.increment_request_count();
        }

        let fut = self.service.call(req);

        Box::pin(async move {
            let result = fut.await;
            let duration_ms = start_time.elapsed().as_millis() as u64;

            let is_error = match &result {
                Ok(response) => {
                    response.status().is_client_error() || response.status().is_server_error()
                }
                Err(_) => true,
            };

            if let Some(metrics) = metrics {
                metrics.record_endpoint_request(&endpoint, duration_ms, is_error);
                if is_error {
                    metrics.increment_error_count();
                }
            }

            result
        })
    }
}

const STANDARD_METHODS: [Method; 7] = [
    Method::GET,
    Method::POST,
    Method::PUT,
    Method::DELETE,
    Method::PATCH,
    Method::HEAD,
    Method::OPTIONS,
];

fn endpoint_key(req: &ServiceRequest) -> String {
    let method = if STANDARD_METHODS.contains(req.method()) {
        req.method().as_str()
    } else {
        "OTHER"
    };
    let pattern = req.match_pattern();
    format!("{} {}", method, pattern.as_deref().unwrap_or(UNMATCHED))
}
