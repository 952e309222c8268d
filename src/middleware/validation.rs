//! Request validation links.
//!
//! [`RequestValidator`] is part of every chain and checks the transport shape:
//! POST, a JSON content type, a body that was read in full and parsed.
//! [`RequiredFields`] is added
//! per endpoint and checks that the fields the handler needs are present and
//! truthy.

use actix_web::http::{Method, StatusCode};
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use super::context::BodyError;
use super::{ApiRequest, ApiResponse, Middleware, Next};

pub struct RequestValidator;

#[async_trait(?Send)]
impl Middleware for RequestValidator {
    async fn handle(&self, req: &mut ApiRequest, next: Next<'_>) -> ApiResponse {
        if req.method != Method::POST {
            return ApiResponse::failure(
                StatusCode::METHOD_NOT_ALLOWED,
                "Method not allowed. Use POST.",
            );
        }
        if !req.has_json_content_type() {
            return ApiResponse::failure(
                StatusCode::BAD_REQUEST,
                "Content-Type must be application/json",
            );
        }
        if let Some(error) = req.body_error() {
            let (status, message) = match error {
                BodyError::TooLarge { limit } => {
                    debug!(limit, "Request body over the configured limit");
                    (StatusCode::PAYLOAD_TOO_LARGE, "Request body too large")
                }
                BodyError::Unreadable(cause) => {
                    debug!(cause = %cause, "Request body could not be read");
                    (StatusCode::BAD_REQUEST, "Invalid request body")
                }
                BodyError::Malformed(cause) => {
                    debug!(cause = %cause, "Request body is not JSON");
                    (StatusCode::BAD_REQUEST, "Invalid JSON body")
                }
            };
            return ApiResponse::failure(status, message);
        }
        next.run(req).await
    }
}

/// How a [`RequiredFields`] list is satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
    All,
    Any,
}

/// Endpoint-specific presence check on top-level body fields.
#[derive(Debug, Clone)]
pub struct RequiredFields {
    fields: Vec<&'static str>,
    requirement: Requirement,
    message: &'static str,
}

impl RequiredFields {
    pub fn new(fields: Vec<&'static str>, requirement: Requirement, message: &'static str) -> Self {
        Self {
            fields,
            requirement,
            message,
        }
    }

    pub fn transcription() -> Self {
        Self::new(vec!["audioUrl"], Requirement::All, "audioUrl is required")
    }

    pub fn extraction() -> Self {
        Self::new(vec!["text"], Requirement::All, "text is required")
    }

    pub fn diagnosis() -> Self {
        Self::new(
            vec!["extractedInfo", "originalText"],
            Requirement::All,
            "extractedInfo and originalText are required",
        )
    }

    pub fn consultation() -> Self {
        Self::new(
            vec!["audioUrl", "text"],
            Requirement::Any,
            "Either audioUrl or text is required",
        )
    }

    pub fn is_satisfied_by(&self, body: &Value) -> bool {
        let present = |name: &&str| body.get(*name).map(is_truthy).unwrap_or(false);
        match self.requirement {
            Requirement::All => self.fields.iter().all(present),
            Requirement::Any => self.fields.iter().any(present),
        }
    }
}

#[async_trait(?Send)]
impl Middleware for RequiredFields {
    async fn handle(&self, req: &mut ApiRequest, next: Next<'_>) -> ApiResponse {
        if !self.is_satisfied_by(req.body()) {
            return ApiResponse::failure(StatusCode::BAD_REQUEST, self.message);
        }
        next.run(req).await
    }
}

/// JavaScript truthiness: `null`, `false`, `0`, `NaN` and `""` are falsy;
/// every array and object is truthy, empty ones included.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppResult;
    use crate::middleware::{Endpoint, MiddlewareChain};
    use actix_web::test::TestRequest;
    use serde_json::json;

    struct Unreachable;

    #[async_trait(?Send)]
    impl Endpoint for Unreachable {
        async fn handle(&self, _req: &ApiRequest) -> AppResult<ApiResponse> {
            unreachable!("validation should have rejected the request")
        }
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!(" ")));
        assert!(is_truthy(&json!(1.5)));
        assert!(is_truthy(&json!({})));
        assert!(is_truthy(&json!([])));
    }

    #[test]
    fn test_all_fields_required() {
        let rule = RequiredFields::diagnosis();
        assert!(rule.is_satisfied_by(&json!({"extractedInfo": {}, "originalText": "x"})));
        assert!(!rule.is_satisfied_by(&json!({"extractedInfo": {}})));
        assert!(!rule.is_satisfied_by(&json!({"extractedInfo": {}, "originalText": ""})));
        assert!(!rule.is_satisfied_by(&json!(null)));
    }

    #[test]
    fn test_any_field_suffices() {
        let rule = RequiredFields::consultation();
        assert!(rule.is_satisfied_by(&json!({"text": "notes"})));
        assert!(rule.is_satisfied_by(&json!({"audioUrl": "https://a/b.mp3"})));
        assert!(!rule.is_satisfied_by(&json!({"text": "", "audioUrl": null})));
        assert!(!rule.is_satisfied_by(&json!({})));
    }

    #[actix_web::test]
    async fn test_missing_field_message() {
        let chain = MiddlewareChain::new().with_validation(RequiredFields::transcription());
        let req = ApiRequest::json(Method::POST, "/api/v1/transcribe", json!({"text": "x"}));

        let response = chain.execute(req, &Unreachable).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = response.body().unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "audioUrl is required");
        assert!(body["timestamp"].is_string());
    }

    #[actix_web::test]
    async fn test_malformed_json_rejected() {
        let http = TestRequest::post()
            .uri("/api/v1/extract")
            .insert_header(("content-type", "application/json"))
            .to_http_request();
        let req = ApiRequest::from_http(&http, Ok(b"{not json".as_slice()), false);

        let response = MiddlewareChain::new().execute(req, &Unreachable).await;

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.body().unwrap()["error"], "Invalid JSON body");
    }

    #[actix_web::test]
    async fn test_oversized_body_rejected_with_cors_headers() {
        let http = TestRequest::post()
            .uri("/api/v1/extract")
            .insert_header(("content-type", "application/json"))
            .to_http_request();
        let req = ApiRequest::from_http(&http, Err(BodyError::TooLarge { limit: 1024 }), false);

        let response = MiddlewareChain::new()
            .with_validation(RequiredFields::extraction())
            .execute(req, &Unreachable)
            .await;

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(response.body().unwrap()["error"], "Request body too large");
        assert_eq!(
            response.headers().get("access-control-allow-origin").unwrap(),
            "*"
        );
    }
}
