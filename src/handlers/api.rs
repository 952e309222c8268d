//! Pipeline endpoints.
//!
//! Each actix handler reads the body (bounded by `server.max_body_bytes`),
//! builds the endpoint's middleware chain and hands it the request; the
//! `Endpoint` implementations below only run once the chain has checked method,
//! content type, body and required fields.

use actix_web::{web, HttpRequest};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::error::AppResult;
use crate::middleware::{
    ApiRequest, ApiResponse, Endpoint, MiddlewareChain, RateLimitPolicy, RateLimiter,
    RequiredFields,
};
use crate::models::MedicalExtraction;
use crate::pipeline::{ConsultationInput, ConsultationPipeline};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranscribeRequest {
    audio_url: String,
}

#[derive(Debug, Deserialize)]
struct ExtractRequest {
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiagnoseRequest {
    extracted_info: MedicalExtraction,
    original_text: String,
}

struct TranscribeEndpoint<'a> {
    pipeline: &'a ConsultationPipeline,
}

#[async_trait(?Send)]
impl Endpoint for TranscribeEndpoint<'_> {
    async fn handle(&self, req: &ApiRequest) -> AppResult<ApiResponse> {
        let payload: TranscribeRequest = req.decode()?;
        let transcription = self.pipeline.transcribe(&payload.audio_url).await?;
        ApiResponse::success(&json!({ "transcription": transcription }))
    }
}

struct ExtractEndpoint<'a> {
    pipeline: &'a ConsultationPipeline,
}

#[async_trait(?Send)]
impl Endpoint for ExtractEndpoint<'_> {
    async fn handle(&self, req: &ApiRequest) -> AppResult<ApiResponse> {
        let payload: ExtractRequest = req.decode()?;
        let extracted_info = self.pipeline.extract(&payload.text).await?;
        ApiResponse::success(&json!({ "extractedInfo": extracted_info }))
    }
}

struct DiagnoseEndpoint<'a> {
    pipeline: &'a ConsultationPipeline,
}

#[async_trait(?Send)]
impl Endpoint for DiagnoseEndpoint<'_> {
    async fn handle(&self, req: &ApiRequest) -> AppResult<ApiResponse> {
        let payload: DiagnoseRequest = req.decode()?;
        let diagnosis = self
            .pipeline
            .diagnose(&payload.extracted_info, &payload.original_text)
            .await?;
        ApiResponse::success(&json!({ "diagnosis": diagnosis }))
    }
}

struct ConsultationEndpoint<'a> {
    pipeline: &'a ConsultationPipeline,
}

#[async_trait(?Send)]
impl Endpoint for ConsultationEndpoint<'_> {
    async fn handle(&self, req: &ApiRequest) -> AppResult<ApiResponse> {
        let input: ConsultationInput = req.decode()?;
        let result = self.pipeline.run(&input).await?;
        ApiResponse::success(&result)
    }
}

pub async fn transcribe(
    req: HttpRequest,
    payload: web::Payload,
    state: web::Data<AppState>,
) -> ApiResponse {
    let request = ApiRequest::read(&req, payload, &state.config.server).await;
    let endpoint = TranscribeEndpoint {
        pipeline: &state.pipeline,
    };
    MiddlewareChain::new()
        .with_validation(RequiredFields::transcription())
        .execute(request, &endpoint)
        .await
}

pub async fn extract(
    req: HttpRequest,
    payload: web::Payload,
    state: web::Data<AppState>,
) -> ApiResponse {
    let request = ApiRequest::read(&req, payload, &state.config.server).await;
    let endpoint = ExtractEndpoint {
        pipeline: &state.pipeline,
    };
    MiddlewareChain::new()
        .with_validation(RequiredFields::extraction())
        .execute(request, &endpoint)
        .await
}

pub async fn diagnose(
    req: HttpRequest,
    payload: web::Payload,
    state: web::Data<AppState>,
) -> ApiResponse {
    let request = ApiRequest::read(&req, payload, &state.config.server).await;
    let endpoint = DiagnoseEndpoint {
        pipeline: &state.pipeline,
    };
    MiddlewareChain::new()
        .with_validation(RequiredFields::diagnosis())
        .execute(request, &endpoint)
        .await
}

/// Full consultation. The only rate-limited endpoint.
pub async fn consultation(
    req: HttpRequest,
    payload: web::Payload,
    state: web::Data<AppState>,
) -> ApiResponse {
    let request = ApiRequest::read(&req, payload, &state.config.server).await;
    let endpoint = ConsultationEndpoint {
        pipeline: &state.pipeline,
    };
    let limiter = RateLimiter::new(
        state.rate_limits.clone(),
        RateLimitPolicy::from_config(&state.config.rate_limit),
    );
    MiddlewareChain::new()
        .with_rate_limit(limiter)
        .with_validation(RequiredFields::consultation())
        .execute(request, &endpoint)
        .await
}
