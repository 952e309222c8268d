//! # Consultation Pipeline
//!
//! Three steps, run in order for a full consultation:
//!
//! ```text
//! audio URL ──► transcription ──┐
//!                               ├─► text ──► extraction ──► diagnosis
//! text ─────────────────────────┘
//! ```
//!
//! Each step is also exposed on its own endpoint. A failing step aborts the
//! rest of the run; there is no partial result and no retry.

pub mod diagnosis;
pub mod extraction;
pub mod json;
pub mod prompts;
pub mod transcription;

use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::models::{ConsultationResult, DiagnosisResult, MedicalExtraction};
use crate::providers::{AudioSource, LanguageModel, SpeechToText};

pub use diagnosis::DiagnosisStep;
pub use extraction::ExtractionStep;
pub use transcription::TranscriptionStep;

/// Input of a full consultation run. Empty strings count as absent; any other
/// text, whitespace included, is used as given.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultationInput {
    pub audio_url: Option<String>,
    pub text: Option<String>,
}

/// Where the consultation text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsultationSource<'a> {
    Text(&'a str),
    Audio(&'a str),
}

impl ConsultationInput {
    /// Text wins when both are given; audio is only transcribed when no text was sent.
    pub fn source(&self) -> Option<ConsultationSource<'_>> {
        non_empty(&self.text)
            .map(ConsultationSource::Text)
            .or_else(|| non_empty(&self.audio_url).map(ConsultationSource::Audio))
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

pub struct ConsultationPipeline {
    transcription: TranscriptionStep,
    extraction: ExtractionStep,
    diagnosis: DiagnosisStep,
}

impl ConsultationPipeline {
    pub fn new(
        audio: Arc<dyn AudioSource>,
        speech: Arc<dyn SpeechToText>,
        model: Arc<dyn LanguageModel>,
        config: &AppConfig,
    ) -> Self {
        let pipeline = &config.pipeline;
        Self {
            transcription: TranscriptionStep::new(audio, speech, pipeline),
            extraction: ExtractionStep::new(model.clone(), pipeline.extraction_temperature),
            diagnosis: DiagnosisStep::new(model, pipeline.diagnosis_temperature),
        }
    }

    pub async fn transcribe(&self, audio_url: &str) -> AppResult<String> {
        self.transcription.run(audio_url).await
    }

    pub async fn extract(&self, text: &str) -> AppResult<MedicalExtraction> {
        self.extraction.run(text).await
    }

    pub async fn diagnose(
        &self,
        extraction: &MedicalExtraction,
        original_text: &str,
    ) -> AppResult<DiagnosisResult> {
        self.diagnosis.run(extraction, original_text).await
    }

    /// Full consultation: optional transcription, then extraction, then diagnosis.
    pub async fn run(&self, input: &ConsultationInput) -> AppResult<ConsultationResult> {
        let source = input.source().ok_or_else(|| {
            AppError::Validation("either audioUrl or text is required".to_string())
        })?;

        let transcription = match source {
            ConsultationSource::Text(text) => text.to_string(),
            ConsultationSource::Audio(url) => self.transcribe(url).await?,
        };

        let extracted_info = self.extract(&transcription).await?;
        let diagnosis = self.diagnose(&extracted_info, &transcription).await?;

        info!(
            has_audio = matches!(source, ConsultationSource::Audio(_)),
            patient_name = extracted_info.patient.name.as_deref().unwrap_or("Unknown"),
            "Complete medical consultation completed"
        );

        Ok(ConsultationResult {
            transcription,
            extracted_info,
            diagnosis,
        })
    }

    /// Whether both providers have credentials; reported by the health endpoint.
    pub fn providers_configured(&self) -> bool {
        self.transcription.provider_configured() && self.extraction.provider_configured()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;

    fn input(audio_url: Option<&str>, text: Option<&str>) -> ConsultationInput {
        ConsultationInput {
            audio_url: audio_url.map(str::to_string),
            text: text.map(str::to_string),
        }
    }

    #[test]
    fn test_source_selection() {
        assert_eq!(
            input(Some("https://a/b.mp3"), Some("typed notes")).source(),
            Some(ConsultationSource::Text("typed notes"))
        );
        assert_eq!(
            input(Some("https://a/b.mp3"), Some("")).source(),
            Some(ConsultationSource::Audio("https://a/b.mp3"))
        );
        assert_eq!(input(None, None).source(), None);
    }

    #[actix_web::test]
    async fn test_whitespace_text_still_wins_over_audio() {
        let test = consultation_pipeline();

        let result = test
            .pipeline
            .run(&input(Some("https://audio.example.com/visit.mp3"), Some("  ")))
            .await
            .unwrap();

        assert_eq!(result.transcription, "  ");
        assert_eq!(test.speech.call_count(), 0);
        assert!(test.audio.requested.lock().unwrap().is_empty());
    }

    #[actix_web::test]
    async fn test_text_input_skips_transcription() {
        let test = consultation_pipeline();
        let text = "Patient Jane, 29, has had a cough for a week.";

        let result = test.pipeline.run(&input(None, Some(text))).await.unwrap();

        assert_eq!(result.transcription, text);
        assert_eq!(test.speech.call_count(), 0);
        assert!(test.audio.requested.lock().unwrap().is_empty());
        assert!(test.model.prompts()[0].contains(text));
    }

    #[actix_web::test]
    async fn test_audio_input_runs_transcription() {
        let test = consultation_pipeline();

        let result = test
            .pipeline
            .run(&input(Some("https://audio.example.com/visit.mp3"), None))
            .await
            .unwrap();

        assert_eq!(result.transcription, AUDIO_TRANSCRIPT);
        assert_eq!(test.speech.call_count(), 1);
        assert_eq!(
            *test.audio.requested.lock().unwrap(),
            vec!["https://audio.example.com/visit.mp3".to_string()]
        );

        let prompts = test.model.prompts();
        assert_eq!(prompts.len(), 2);
        assert!(prompts[0].contains(AUDIO_TRANSCRIPT));
        assert!(prompts[1].contains(AUDIO_TRANSCRIPT));
        assert_eq!(result.extracted_info.symptoms.len(), 3);
        assert_eq!(
            result.diagnosis.diagnosis,
            "Viral upper respiratory tract infection"
        );
    }

    #[actix_web::test]
    async fn test_failed_extraction_stops_the_run() {
        let test = pipeline_with_replies(["not json at all"]);

        let err = test
            .pipeline
            .run(&input(None, Some("some notes")))
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Extraction(_)));
        // diagnosis never asked
        assert_eq!(test.model.prompts().len(), 1);
    }

    #[actix_web::test]
    async fn test_missing_input_is_a_validation_error() {
        let test = consultation_pipeline();
        let err = test.pipeline.run(&input(None, Some(""))).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
