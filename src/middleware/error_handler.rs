//! Error envelope for failures raised by an endpoint handler.

use chrono::Utc;
use serde_json::json;
use tracing::error;

use super::{ApiRequest, ApiResponse};
use crate::error::AppError;

/// Turn a handler error into the JSON error envelope.
///
/// Internal details travel in `details`; the `error` field only ever holds
/// one of the fixed classification messages.
pub fn handle_error(err: &AppError, req: &ApiRequest) -> ApiResponse {
    let request_id = req.request_id();

    error!(
        request_id = %request_id,
        endpoint = %req.path,
        error = ?err,
        "Request failed"
    );

    let (status, message) = err.classify();
    ApiResponse::json(
        status,
        json!({
            "success": false,
            "error": message,
            "details": err.to_string(),
            "timestamp": Utc::now().to_rfc3339(),
            "requestId": request_id,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::context::UNKNOWN;
    use actix_web::http::{Method, StatusCode};

    fn request() -> ApiRequest {
        ApiRequest::new(Method::POST, "/api/v1/consultation")
    }

    #[test]
    fn test_envelope_shape() {
        let err = AppError::Extraction("model returned nothing".to_string());
        let response = handle_error(&err, &request());

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = response.body().unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Medical information extraction failed");
        assert_eq!(
            body["details"],
            "Medical extraction failed: model returned nothing"
        );
        assert_eq!(body["requestId"], UNKNOWN);
        assert!(body["timestamp"].is_string());
    }

    #[test]
    fn test_validation_is_a_client_error() {
        let err = AppError::Validation("extractedInfo must be an object".to_string());
        let response = handle_error(&err, &request());

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.body().unwrap()["error"], "Validation error");
    }

    #[test]
    fn test_opaque_errors_classified_by_message() {
        let err = AppError::Internal("Diagnosis generation failed: upstream 502".to_string());
        let response = handle_error(&err, &request());
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(response.body().unwrap()["error"], "Diagnosis generation failed");

        let err = AppError::Internal("disk on fire".to_string());
        let response = handle_error(&err, &request());
        assert_eq!(response.body().unwrap()["error"], "Internal server error");
    }
}
