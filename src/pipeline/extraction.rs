//! # Extraction Step
//!
//! Sends the consultation text to the language model with a fixed extraction
//! prompt and JSON output requested, then reads the reply as a
//! [`MedicalExtraction`]. Only a reply that is empty or not JSON at all fails,
//! as [`AppError::Extraction`]; see [`crate::models`] for how odd field shapes
//! are read.

use std::sync::Arc;

use tracing::info;

use super::json::parse_model_object;
use super::prompts::{extraction_prompt, EXTRACTION_SYSTEM};
use crate::error::{AppError, AppResult};
use crate::models::MedicalExtraction;
use crate::providers::{CompletionRequest, LanguageModel};

/// Extracts symptoms, patient details and the consultation reason from free
/// text. The reply only has to be JSON; fields that are missing or of an
/// unexpected shape fall back to their defaults.
pub struct ExtractionStep {
    model: Arc<dyn LanguageModel>,
    temperature: f32,
}

impl ExtractionStep {
    pub fn new(model: Arc<dyn LanguageModel>, temperature: f32) -> Self {
        Self { model, temperature }
    }

    pub async fn run(&self, text: &str) -> AppResult<MedicalExtraction> {
        let request = CompletionRequest {
            system: EXTRACTION_SYSTEM.to_string(),
            prompt: extraction_prompt(text),
            temperature: self.temperature,
            json_output: true,
        };

        let reply = self
            .model
            .complete(request)
            .await
            .map_err(|e| AppError::Extraction(e.to_string()))?
            .ok_or_else(|| AppError::Extraction("no response from language model".to_string()))?;

        let extraction: MedicalExtraction = parse_model_object(&reply)
            .map_err(|e| AppError::Extraction(format!("model reply is not valid JSON: {}", e)))?;

        info!(
            provider = self.model.name(),
            text_length = text.len(),
            symptoms_count = extraction.symptoms.len(),
            "Medical information extraction completed"
        );

        Ok(extraction)
    }

    pub fn provider_configured(&self) -> bool {
        self.model.is_configured()
    }
}
