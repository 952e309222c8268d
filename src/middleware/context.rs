//! Request and response values that travel through the middleware chain.
//!
//! The chain works on these instead of raw actix types so a middleware can
//! inspect or rewrite the response body after the handler produced it (the
//! analytics wrapper merges `metadata` into successful JSON bodies).

use std::net::SocketAddr;
use std::time::Instant;

use actix_web::{
    body::BoxBody,
    http::{
        header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE},
        Method, StatusCode,
    },
    web, HttpRequest, HttpResponse, Responder,
};
use chrono::{DateTime, Utc};
use futures_util::StreamExt;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::{json, Value};

use crate::config::ServerConfig;
use crate::error::AppResult;

/// Placeholder used when no request id or client address is known.
pub const UNKNOWN: &str = "unknown";

/// Per-request bookkeeping attached by the analytics wrapper.
#[derive(Debug, Clone)]
pub struct RequestMetadata {
    pub request_id: String,
    pub start_time: DateTime<Utc>,
    pub started_at: Instant,
    pub endpoint: String,
    pub method: String,
}

/// Merged into successful JSON bodies as `metadata`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    /// Milliseconds between request entry and response emission
    pub latency: u64,
    pub timestamp: String,
    pub request_id: String,
    pub status: u16,
}

/// Why a request body could not be used. Reported by the request validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyError {
    /// More than `limit` bytes were sent; the rest was never buffered
    TooLarge { limit: usize },
    /// The payload stream failed before it completed
    Unreadable(String),
    /// The body is not JSON
    Malformed(String),
}

/// An inbound call as seen by the middleware chain.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub content_type: Option<String>,
    /// Client IP used as the rate-limit key
    pub client_addr: Option<String>,
    pub metadata: Option<RequestMetadata>,
    body: Value,
    body_error: Option<BodyError>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            content_type: None,
            client_addr: None,
            metadata: None,
            body: Value::Null,
            body_error: None,
        }
    }

    /// Read the payload (at most `server.max_body_bytes`) and capture what the
    /// chain needs. Body problems are recorded rather than answered here, so the
    /// rejection still goes through the chain and carries the CORS headers.
    pub async fn read(req: &HttpRequest, payload: web::Payload, server: &ServerConfig) -> Self {
        let body = read_body(payload, server.max_body_bytes).await;
        let body = match &body {
            Ok(bytes) => Ok(&bytes[..]),
            Err(e) => Err(e.clone()),
        };
        Self::from_http(req, body, server.trust_forwarded_headers)
    }

    /// Capture what the chain needs from an actix request and its body.
    /// An empty body is `null`; a body that is not JSON is remembered as an
    /// error for the validator to report.
    pub fn from_http(
        req: &HttpRequest,
        body: Result<&[u8], BodyError>,
        trust_forwarded_headers: bool,
    ) -> Self {
        let mut request = Self::new(req.method().clone(), req.path());
        request.content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        request.client_addr = client_ip(req, trust_forwarded_headers);

        match body {
            Ok([]) => {}
            Ok(bytes) => match serde_json::from_slice(bytes) {
                Ok(value) => request.body = value,
                Err(e) => request.body_error = Some(BodyError::Malformed(e.to_string())),
            },
            Err(e) => request.body_error = Some(e),
        }
        request
    }

    /// Test and internal constructor for a JSON POST.
    pub fn json(method: Method, path: impl Into<String>, body: Value) -> Self {
        let mut request = Self::new(method, path);
        request.content_type = Some("application/json".to_string());
        request.body = body;
        request
    }

    pub fn body(&self) -> &Value {
        &self.body
    }

    pub fn body_error(&self) -> Option<&BodyError> {
        self.body_error.as_ref()
    }

    /// Media type check that ignores parameters such as `charset`.
    pub fn has_json_content_type(&self) -> bool {
        self.content_type
            .as_deref()
            .and_then(|ct| ct.split(';').next())
            .map(|media| media.trim().eq_ignore_ascii_case("application/json"))
            .unwrap_or(false)
    }

    pub fn request_id(&self) -> &str {
        self.metadata
            .as_ref()
            .map(|m| m.request_id.as_str())
            .unwrap_or(UNKNOWN)
    }

    pub fn client_key(&self) -> &str {
        self.client_addr.as_deref().unwrap_or(UNKNOWN)
    }

    /// Decode the JSON body into a typed payload.
    pub fn decode<T: DeserializeOwned>(&self) -> AppResult<T> {
        Ok(T::deserialize(&self.body)?)
    }
}

/// Buffer the payload, giving up as soon as it exceeds `limit`.
async fn read_body(mut payload: web::Payload, limit: usize) -> Result<web::BytesMut, BodyError> {
    let mut body = web::BytesMut::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(|e| BodyError::Unreadable(e.to_string()))?;
        if body.len() + chunk.len() > limit {
            return Err(BodyError::TooLarge { limit });
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

/// The socket peer IP, without the port. Forwarding headers are only read when
/// the deployment says a trusted proxy sets them; a client can write any value
/// into them.
fn client_ip(req: &HttpRequest, trust_forwarded_headers: bool) -> Option<String> {
    if trust_forwarded_headers {
        if let Some(addr) = req.connection_info().realip_remote_addr() {
            return Some(host_part(addr));
        }
    }
    req.peer_addr().map(|addr| addr.ip().to_string())
}

fn host_part(addr: &str) -> String {
    addr.parse::<SocketAddr>()
        .map(|socket| socket.ip().to_string())
        .unwrap_or_else(|_| addr.to_string())
}

/// A response under construction. Converted into an actix response only once
/// the whole chain has returned.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Option<Value>,
}

impl ApiResponse {
    pub fn json(status: StatusCode, body: Value) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Some(body),
        }
    }

    pub fn no_content() -> Self {
        Self {
            status: StatusCode::NO_CONTENT,
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// `{success: true, result, processedAt}`
    pub fn success<T: Serialize>(result: &T) -> AppResult<Self> {
        Ok(Self::json(
            StatusCode::OK,
            json!({
                "success": true,
                "result": serde_json::to_value(result)?,
                "processedAt": Utc::now().to_rfc3339(),
            }),
        ))
    }

    /// `{success: false, error, timestamp}` used by the chain's own rejections.
    pub fn failure(status: StatusCode, error: &str) -> Self {
        Self::json(
            status,
            json!({
                "success": false,
                "error": error,
                "timestamp": Utc::now().to_rfc3339(),
            }),
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> Option<&Value> {
        self.body.as_ref()
    }

    pub fn insert_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    /// Merge `metadata` into the body when it is an object not marked
    /// `success: false`. Returns whether the body was changed.
    pub fn attach_metadata(&mut self, metadata: &ResponseMetadata) -> bool {
        let Some(Value::Object(body)) = self.body.as_mut() else {
            return false;
        };
        if body.get("success") == Some(&Value::Bool(false)) {
            return false;
        }
        match serde_json::to_value(metadata) {
            Ok(value) => {
                body.insert("metadata".to_string(), value);
                true
            }
            Err(_) => false,
        }
    }

    pub fn into_http_response(self) -> HttpResponse {
        let mut builder = HttpResponse::build(self.status);
        for (name, value) in self.headers.iter() {
            builder.insert_header((name.clone(), value.clone()));
        }
        match self.body {
            Some(body) => builder.json(body),
            None => builder.finish(),
        }
    }
}

impl Responder for ApiResponse {
    type Body = BoxBody;

    fn respond_to(self, _req: &HttpRequest) -> HttpResponse<Self::Body> {
        self.into_http_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> ResponseMetadata {
        ResponseMetadata {
            latency: 12,
            timestamp: "2025-01-01T00:00:00Z".to_string(),
            request_id: "req_1_abc".to_string(),
            status: 200,
        }
    }

    #[test]
    fn test_content_type_check_ignores_parameters() {
        let mut req = ApiRequest::new(Method::POST, "/x");
        assert!(!req.has_json_content_type());

        req.content_type = Some("application/json; charset=utf-8".to_string());
        assert!(req.has_json_content_type());

        req.content_type = Some("text/plain".to_string());
        assert!(!req.has_json_content_type());
    }

    #[test]
    fn test_request_id_defaults_to_unknown() {
        let req = ApiRequest::new(Method::POST, "/x");
        assert_eq!(req.request_id(), UNKNOWN);
        assert_eq!(req.client_key(), UNKNOWN);
    }

    #[test]
    fn test_metadata_attached_to_success_bodies_only() {
        let mut ok = ApiResponse::json(StatusCode::OK, json!({"success": true}));
        assert!(ok.attach_metadata(&metadata()));
        assert_eq!(ok.body().unwrap()["metadata"]["requestId"], "req_1_abc");
        assert_eq!(ok.body().unwrap()["metadata"]["latency"], 12);

        // no success flag at all still counts as successful
        let mut plain = ApiResponse::json(StatusCode::OK, json!({"value": 1}));
        assert!(plain.attach_metadata(&metadata()));

        let mut failed = ApiResponse::failure(StatusCode::BAD_REQUEST, "nope");
        assert!(!failed.attach_metadata(&metadata()));
        assert!(failed.body().unwrap().get("metadata").is_none());

        let mut empty = ApiResponse::no_content();
        assert!(!empty.attach_metadata(&metadata()));

        let mut array = ApiResponse::json(StatusCode::OK, json!([1, 2]));
        assert!(!array.attach_metadata(&metadata()));
    }

    #[test]
    fn test_client_ip_ignores_forwarding_headers_by_default() {
        let http = actix_web::test::TestRequest::post()
            .peer_addr("10.0.0.9:51234".parse().unwrap())
            .insert_header(("x-forwarded-for", "1.2.3.4"))
            .to_http_request();

        let req = ApiRequest::from_http(&http, Ok(b"".as_slice()), false);
        assert_eq!(req.client_key(), "10.0.0.9");

        let req = ApiRequest::from_http(&http, Ok(b"".as_slice()), true);
        assert_eq!(req.client_key(), "1.2.3.4");
    }

    #[test]
    fn test_peer_port_is_not_part_of_the_key() {
        let first = actix_web::test::TestRequest::post()
            .peer_addr("10.0.0.9:40000".parse().unwrap())
            .to_http_request();
        let second = actix_web::test::TestRequest::post()
            .peer_addr("10.0.0.9:40001".parse().unwrap())
            .to_http_request();

        assert_eq!(
            ApiRequest::from_http(&first, Ok(b"".as_slice()), true).client_key(),
            ApiRequest::from_http(&second, Ok(b"".as_slice()), true).client_key()
        );
    }

    #[test]
    fn test_body_errors_are_recorded() {
        let http = actix_web::test::TestRequest::post().to_http_request();

        let req = ApiRequest::from_http(&http, Ok(b"{not json".as_slice()), false);
        assert!(matches!(req.body_error(), Some(BodyError::Malformed(_))));

        let req = ApiRequest::from_http(&http, Err(BodyError::TooLarge { limit: 10 }), false);
        assert_eq!(req.body_error(), Some(&BodyError::TooLarge { limit: 10 }));
        assert_eq!(req.body(), &Value::Null);

        let req = ApiRequest::from_http(&http, Ok(b"".as_slice()), false);
        assert!(req.body_error().is_none());
    }

    #[test]
    fn test_decode_reports_validation_error() {
        #[derive(serde::Deserialize)]
        struct Payload {
            #[allow(dead_code)]
            text: String,
        }

        let req = ApiRequest::json(Method::POST, "/x", json!({"text": 42}));
        let err = req.decode::<Payload>().err().unwrap();
        assert!(matches!(err, crate::error::AppError::Validation(_)));
    }
}
