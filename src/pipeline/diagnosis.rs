//! # Diagnosis Step
//!
//! Second language-model call of a consultation. The prompt embeds the patient
//! fields, symptoms, consultation reason and the original text; the model
//! answers with diagnosis, treatment and recommendations. The `fullReport` is
//! rendered locally from those and the extraction, so the same reply always
//! gives the same report.

use std::sync::Arc;

use serde::Deserialize;
use tracing::info;

use super::json::parse_model_object;
use super::prompts::{diagnosis_prompt, or_unknown, DIAGNOSIS_SYSTEM};
use crate::error::{AppError, AppResult};
use crate::models::{lenient_text, DiagnosisResult, MedicalExtraction};
use crate::providers::{CompletionRequest, LanguageModel};

/// The part of the diagnosis the model writes. Lists (a common way for models
/// to phrase a treatment plan) are joined one item per line.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DiagnosisReply {
    #[serde(deserialize_with = "lenient_text")]
    diagnosis: String,
    #[serde(deserialize_with = "lenient_text")]
    treatment: String,
    #[serde(deserialize_with = "lenient_text")]
    recommendations: String,
}

/// Generates diagnosis, treatment and recommendations from an extraction and
/// the text it came from, then assembles the full report.
pub struct DiagnosisStep {
    model: Arc<dyn LanguageModel>,
    temperature: f32,
}

impl DiagnosisStep {
    pub fn new(model: Arc<dyn LanguageModel>, temperature: f32) -> Self {
        Self { model, temperature }
    }

    pub async fn run(
        &self,
        extraction: &MedicalExtraction,
        original_text: &str,
    ) -> AppResult<DiagnosisResult> {
        let request = CompletionRequest {
            system: DIAGNOSIS_SYSTEM.to_string(),
            prompt: diagnosis_prompt(extraction, original_text),
            temperature: self.temperature,
            json_output: true,
        };

        let reply = self
            .model
            .complete(request)
            .await
            .map_err(|e| AppError::Diagnosis(e.to_string()))?
            .ok_or_else(|| AppError::Diagnosis("no response from language model".to_string()))?;

        let reply: DiagnosisReply = parse_model_object(&reply)
            .map_err(|e| AppError::Diagnosis(format!("model reply is not valid JSON: {}", e)))?;

        let full_report = render_full_report(extraction, &reply);

        info!(
            provider = self.model.name(),
            patient_name = extraction.patient.name.as_deref().unwrap_or("Unknown"),
            symptoms_count = extraction.symptoms.len(),
            "Diagnosis generation completed"
        );

        Ok(DiagnosisResult {
            diagnosis: reply.diagnosis,
            treatment: reply.treatment,
            recommendations: reply.recommendations,
            full_report,
        })
    }
}

/// Plain-text report shown in the browser client's report card.
fn render_full_report(extraction: &MedicalExtraction, reply: &DiagnosisReply) -> String {
    let patient = &extraction.patient;
    let age = patient
        .age
        .map(|a| a.to_string())
        .unwrap_or_else(|| "Unknown".to_string());
    let symptoms = if extraction.symptoms.is_empty() {
        "None reported".to_string()
    } else {
        extraction.symptoms.join(", ")
    };

    format!(
        "MEDICAL REPORT\n\n\
         Patient: {name} (Age: {age})\n\
         ID: {id}\n\
         Gender: {gender}\n\n\
         CONSULTATION REASON:\n{reason}\n\n\
         SYMPTOMS:\n{symptoms}\n\n\
         DIAGNOSIS:\n{diagnosis}\n\n\
         TREATMENT PLAN:\n{treatment}\n\n\
         RECOMMENDATIONS:\n{recommendations}\n",
        name = or_unknown(patient.name.as_deref()),
        id = or_unknown(patient.id.as_deref()),
        gender = or_unknown(patient.gender.as_deref()),
        reason = extraction.consultation_reason,
        diagnosis = reply.diagnosis,
        treatment = reply.treatment,
        recommendations = reply.recommendations,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PatientInfo;
    use crate::providers::testing::ScriptedModel;

    const REPLY: &str = r#"```json
{"diagnosis": "Viral pharyngitis", "treatment": "Rest and fluids", "recommendations": "Return if fever persists"}
```"#;

    fn extraction() -> MedicalExtraction {
        MedicalExtraction {
            symptoms: vec!["fever".to_string(), "sore throat".to_string()],
            patient: PatientInfo {
                name: Some("John Doe".to_string()),
                age: Some(35),
                id: Some("12345678".to_string()),
                gender: None,
            },
            consultation_reason: "Throat pain for three days".to_string(),
        }
    }

    #[actix_web::test]
    async fn test_builds_result_and_report() {
        let model = Arc::new(ScriptedModel::with_replies([REPLY]));
        let step = DiagnosisStep::new(model.clone(), 0.3);

        let result = step.run(&extraction(), "original text").await.unwrap();

        assert_eq!(result.diagnosis, "Viral pharyngitis");
        assert_eq!(result.treatment, "Rest and fluids");
        assert!(result.full_report.contains("Patient: John Doe (Age: 35)"));
        assert!(result.full_report.contains("ID: 12345678"));
        assert!(result.full_report.contains("Gender: Unknown"));
        assert!(result.full_report.contains("fever, sore throat"));
        assert!(result.full_report.contains("Return if fever persists"));
        assert!(model.prompts()[0].contains("original text"));
    }

    #[actix_web::test]
    async fn test_report_is_deterministic() {
        let model = Arc::new(ScriptedModel::with_replies([REPLY, REPLY]));
        let step = DiagnosisStep::new(model, 0.3);

        let first = step.run(&extraction(), "text").await.unwrap();
        let second = step.run(&extraction(), "text").await.unwrap();
        assert_eq!(first, second);
    }

    #[actix_web::test]
    async fn test_list_and_null_fields_are_accepted() {
        let reply = r#"{"diagnosis": "Influenza", "treatment": ["rest", "fluids"], "recommendations": null}"#;
        let model = Arc::new(ScriptedModel::with_replies([reply]));
        let step = DiagnosisStep::new(model, 0.3);

        let result = step.run(&extraction(), "text").await.unwrap();

        assert_eq!(result.diagnosis, "Influenza");
        assert_eq!(result.treatment, "rest\nfluids");
        assert_eq!(result.recommendations, "");
        assert!(result.full_report.contains("TREATMENT PLAN:\nrest\nfluids"));
    }

    #[actix_web::test]
    async fn test_non_object_reply_gives_empty_sections() {
        let model = Arc::new(ScriptedModel::with_replies(["[1, 2, 3]"]));
        let step = DiagnosisStep::new(model, 0.3);

        let result = step.run(&extraction(), "text").await.unwrap();
        assert_eq!(result.diagnosis, "");
        assert!(result.full_report.contains("Patient: John Doe"));
    }

    #[actix_web::test]
    async fn test_invalid_reply_fails() {
        let model = Arc::new(ScriptedModel::with_replies(["The patient likely has the flu."]));
        let step = DiagnosisStep::new(model, 0.3);

        let err = step.run(&extraction(), "text").await.unwrap_err();
        assert!(matches!(err, AppError::Diagnosis(_)));
        assert!(err.to_string().starts_with("Diagnosis generation failed"));
    }

    #[test]
    fn test_report_without_symptoms() {
        let report = render_full_report(&MedicalExtraction::default(), &DiagnosisReply::default());
        assert!(report.contains("Patient: Unknown (Age: Unknown)"));
        assert!(report.contains("SYMPTOMS:\nNone reported"));
    }
}
