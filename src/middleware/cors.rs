//! # CORS Gate
//!
//! Outermost link of every chain. It stamps the allow-origin, allow-methods and
//! allow-headers headers on whatever the rest of the chain returns, so
//! rejections and error envelopes carry them too. Preflight `OPTIONS` requests
//! are answered here with 204 and never reach validation.

use actix_web::http::{
    header::{
        HeaderValue, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
        ACCESS_CONTROL_ALLOW_ORIGIN,
    },
    Method,
};
use async_trait::async_trait;

use super::{ApiRequest, ApiResponse, Middleware, Next};

const ALLOW_METHODS: &str = "GET, POST, PUT, DELETE, OPTIONS";
const ALLOW_HEADERS: &str = "Content-Type, Authorization";

/// Permissive CORS for the browser client. Preflight `OPTIONS` calls are
/// answered here with an empty 204 and never reach later links.
pub struct CorsGate;

#[async_trait(?Send)]
impl Middleware for CorsGate {
    async fn handle(&self, req: &mut ApiRequest, next: Next<'_>) -> ApiResponse {
        let mut response = if req.method == Method::OPTIONS {
            ApiResponse::no_content()
        } else {
            next.run(req).await
        };
        apply_cors_headers(&mut response);
        response
    }
}

pub fn apply_cors_headers(response: &mut ApiResponse) {
    response.insert_header(ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    response.insert_header(
        ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOW_METHODS),
    );
    response.insert_header(
        ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOW_HEADERS),
    );
}
