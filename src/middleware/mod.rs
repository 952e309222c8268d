//! # Middleware
//!
//! Two kinds of middleware live here:
//!
//! - [`MiddlewareChain`]: the per-endpoint chain of responsibility every API
//!   call goes through (CORS → analytics → request validation → optional rate
//!   limit → endpoint validation → handler). Each link receives a [`Next`]
//!   continuation and either calls it or answers on its own.
//! - [`MetricsMiddleware`]: an actix `Transform` wrapped around the whole app
//!   that feeds the `/metrics` endpoint.
//!
//! The chain is rebuilt for every request. Apart from the rate-limit store
//! nothing is shared between requests.

pub mod analytics;
pub mod context;
pub mod cors;
pub mod error_handler;
pub mod metrics;
pub mod rate_limit;
pub mod validation;

use std::any::Any;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures_util::FutureExt;

use crate::error::{AppError, AppResult};

pub use analytics::Analytics;
pub use context::{ApiRequest, ApiResponse};
pub use cors::CorsGate;
pub use metrics::MetricsMiddleware;
pub use rate_limit::{RateLimitPolicy, RateLimitStore, RateLimiter};
pub use validation::{RequestValidator, RequiredFields};

/// One link of the chain.
///
/// Call `next.run(req)` to continue; return a response without calling it to
/// short-circuit. Whatever comes back from `next` can be adjusted before it is
/// returned.
#[async_trait(?Send)]
pub trait Middleware {
    async fn handle(&self, req: &mut ApiRequest, next: Next<'_>) -> ApiResponse;
}

/// The handler at the end of the chain.
#[async_trait(?Send)]
pub trait Endpoint {
    async fn handle(&self, req: &ApiRequest) -> AppResult<ApiResponse>;
}

/// Continuation handed to each middleware: the links after it plus the endpoint.
pub struct Next<'a> {
    chain: &'a [Box<dyn Middleware>],
    endpoint: &'a dyn Endpoint,
}

impl<'a> Next<'a> {
    pub async fn run(self, req: &mut ApiRequest) -> ApiResponse {
        match self.chain.split_first() {
            Some((current, rest)) => {
                let next = Next {
                    chain: rest,
                    endpoint: self.endpoint,
                };
                current.handle(req, next).await
            }
            None => invoke_endpoint(self.endpoint, req).await,
        }
    }
}

/// Run the handler; errors and panics both end up in the error handler.
async fn invoke_endpoint(endpoint: &dyn Endpoint, req: &mut ApiRequest) -> ApiResponse {
    let outcome = AssertUnwindSafe(endpoint.handle(req)).catch_unwind().await;

    let result = outcome.unwrap_or_else(|panic| {
        Err(AppError::Internal(format!(
            "handler panicked: {}",
            panic_message(panic.as_ref())
        )))
    });

    match result {
        Ok(response) => response,
        Err(err) => error_handler::handle_error(&err, req),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

/// Ordered middleware list with a fluent builder.
pub struct MiddlewareChain {
    middlewares: Vec<Box<dyn Middleware>>,
}

impl MiddlewareChain {
    /// Chain seeded with the links every endpoint gets: CORS, analytics and
    /// the POST/JSON request validator.
    pub fn new() -> Self {
        Self {
            middlewares: vec![
                Box::new(CorsGate),
                Box::new(Analytics),
                Box::new(RequestValidator),
            ],
        }
    }

    pub fn with_rate_limit(self, limiter: RateLimiter) -> Self {
        self.with(limiter)
    }

    pub fn with_validation(self, validator: RequiredFields) -> Self {
        self.with(validator)
    }

    pub fn with<M: Middleware + 'static>(mut self, middleware: M) -> Self {
        self.middlewares.push(Box::new(middleware));
        self
    }

    pub async fn execute(&self, mut req: ApiRequest, endpoint: &dyn Endpoint) -> ApiResponse {
        let next = Next {
            chain: &self.middlewares,
            endpoint,
        };
        next.run(&mut req).await
    }
}

impl Default for MiddlewareChain {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::{Method, StatusCode};
    use serde_json::json;
    use std::cell::Cell;

    /// Counts invocations and answers with a fixed outcome.
    struct StubEndpoint {
        calls: Cell<usize>,
        outcome: fn() -> AppResult<ApiResponse>,
    }

    impl StubEndpoint {
        fn ok() -> Self {
            Self {
                calls: Cell::new(0),
                outcome: || ApiResponse::success(&json!({"answer": 42})),
            }
        }

        fn failing(outcome: fn() -> AppResult<ApiResponse>) -> Self {
            Self {
                calls: Cell::new(0),
                outcome,
            }
        }
    }

    #[async_trait(?Send)]
    impl Endpoint for StubEndpoint {
        async fn handle(&self, _req: &ApiRequest) -> AppResult<ApiResponse> {
            self.calls.set(self.calls.get() + 1);
            (self.outcome)()
        }
    }

    struct PanickingEndpoint;

    #[async_trait(?Send)]
    impl Endpoint for PanickingEndpoint {
        async fn handle(&self, _req: &ApiRequest) -> AppResult<ApiResponse> {
            panic!("boom");
        }
    }

    fn post(body: serde_json::Value) -> ApiRequest {
        ApiRequest::json(Method::POST, "/api/v1/extract", body)
    }

    #[actix_web::test]
    async fn test_non_post_methods_never_reach_the_handler() {
        for method in [Method::GET, Method::PUT, Method::DELETE, Method::PATCH] {
            let endpoint = StubEndpoint::ok();
            let chain = MiddlewareChain::new().with_validation(RequiredFields::extraction());

            let response = chain
                .execute(ApiRequest::new(method.clone(), "/api/v1/extract"), &endpoint)
                .await;

            assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED, "{}", method);
            assert_eq!(endpoint.calls.get(), 0);
            assert_eq!(
                response.headers().get("access-control-allow-origin").unwrap(),
                "*"
            );
        }
    }

    #[actix_web::test]
    async fn test_options_short_circuits_before_validation() {
        let endpoint = StubEndpoint::ok();
        let chain = MiddlewareChain::new().with_validation(RequiredFields::diagnosis());

        let response = chain
            .execute(ApiRequest::new(Method::OPTIONS, "/api/v1/diagnose"), &endpoint)
            .await;

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.body().is_none());
        assert!(response.headers().contains_key("access-control-allow-methods"));
        assert_eq!(endpoint.calls.get(), 0);
    }

    #[actix_web::test]
    async fn test_wrong_content_type_is_rejected() {
        let endpoint = StubEndpoint::ok();
        let mut req = post(json!({"text": "hello"}));
        req.content_type = Some("text/plain".to_string());

        let response = MiddlewareChain::new().execute(req, &endpoint).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            response.body().unwrap()["error"],
            "Content-Type must be application/json"
        );
        assert_eq!(endpoint.calls.get(), 0);
    }

    #[actix_web::test]
    async fn test_success_gets_metadata() {
        let endpoint = StubEndpoint::ok();
        let chain = MiddlewareChain::new().with_validation(RequiredFields::extraction());

        let response = chain.execute(post(json!({"text": "hello"})), &endpoint).await;

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(endpoint.calls.get(), 1);
        let body = response.body().unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["result"]["answer"], 42);
        let request_id = body["metadata"]["requestId"].as_str().unwrap();
        assert!(request_id.starts_with("req_"));
        assert_eq!(body["metadata"]["status"], 200);
    }

    #[actix_web::test]
    async fn test_handler_errors_use_the_error_envelope() {
        let endpoint = StubEndpoint::failing(|| {
            Err(AppError::Transcription("provider timed out".to_string()))
        });

        let response = MiddlewareChain::new()
            .execute(post(json!({"audioUrl": "https://a/b.mp3"})), &endpoint)
            .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = response.body().unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Audio transcription failed");
        assert_eq!(body["details"], "Transcription failed: provider timed out");
        assert!(body["requestId"].as_str().unwrap().starts_with("req_"));
        assert!(body.get("metadata").is_none());
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
    }

    #[actix_web::test]
    async fn test_handler_panic_is_contained() {
        let response = MiddlewareChain::new()
            .execute(post(json!({"text": "x"})), &PanickingEndpoint)
            .await;

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = response.body().unwrap();
        assert_eq!(body["error"], "Internal server error");
        assert_eq!(body["details"], "handler panicked: boom");
    }
}
