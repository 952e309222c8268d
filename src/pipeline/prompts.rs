//! Prompt templates for the extraction and diagnosis steps.

use crate::models::MedicalExtraction;

pub const EXTRACTION_SYSTEM: &str =
    "You are a medical assistant that extracts structured data from consultation notes. \
     Always answer with a single valid JSON object and nothing else.";

pub const DIAGNOSIS_SYSTEM: &str =
    "You are an experienced physician writing a preliminary assessment for review by a \
     licensed doctor. Always answer with a single valid JSON object and nothing else.";

/// Instruction asking for the `MedicalExtraction` JSON shape.
pub fn extraction_prompt(text: &str) -> String {
    format!(
        r#"Extract the medical information from the following consultation text.

Return a JSON object with exactly this structure:
{{
  "symptoms": ["symptom 1", "symptom 2"],
  "patient": {{
    "name": "patient name or null",
    "age": patient age as an integer or null,
    "id": "patient identification number or null",
    "gender": "patient gender or null"
  }},
  "consultationReason": "main reason for the consultation"
}}

Only include information stated in the text. Use null for unknown patient fields
and an empty list when no symptoms are mentioned.

Consultation text:
"""
{text}
""""#
    )
}

/// Instruction asking for diagnosis, treatment and recommendations.
pub fn diagnosis_prompt(extraction: &MedicalExtraction, original_text: &str) -> String {
    let patient = &extraction.patient;
    let symptoms = if extraction.symptoms.is_empty() {
        "None reported".to_string()
    } else {
        extraction.symptoms.join(", ")
    };

    format!(
        r#"Based on the following patient information, provide a preliminary diagnosis.

Patient name: {name}
Age: {age}
ID: {id}
Gender: {gender}
Symptoms: {symptoms}
Consultation reason: {reason}

Original consultation text:
"""
{original_text}
"""

Return a JSON object with exactly this structure:
{{
  "diagnosis": "most likely diagnosis with a short justification",
  "treatment": "recommended treatment plan",
  "recommendations": "follow-up recommendations and warning signs"
}}"#,
        name = or_unknown(patient.name.as_deref()),
        age = patient
            .age
            .map(|a| a.to_string())
            .unwrap_or_else(|| "Unknown".to_string()),
        id = or_unknown(patient.id.as_deref()),
        gender = or_unknown(patient.gender.as_deref()),
        reason = if extraction.consultation_reason.is_empty() {
            "Not specified"
        } else {
            extraction.consultation_reason.as_str()
        },
    )
}

pub(crate) fn or_unknown(value: Option<&str>) -> &str {
    value.filter(|v| !v.trim().is_empty()).unwrap_or("Unknown")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PatientInfo;

    #[test]
    fn test_extraction_prompt_embeds_text() {
        let prompt = extraction_prompt("Patient reports fever.");
        assert!(prompt.contains("Patient reports fever."));
        assert!(prompt.contains("\"consultationReason\""));
    }

    #[test]
    fn test_diagnosis_prompt_embeds_patient_fields() {
        let extraction = MedicalExtraction {
            symptoms: vec!["fever".to_string(), "sore throat".to_string()],
            patient: PatientInfo {
                name: Some("Jane Roe".to_string()),
                age: Some(29),
                id: None,
                gender: Some("female".to_string()),
            },
            consultation_reason: "Throat pain".to_string(),
        };

        let prompt = diagnosis_prompt(&extraction, "original note");
        assert!(prompt.contains("Patient name: Jane Roe"));
        assert!(prompt.contains("Age: 29"));
        assert!(prompt.contains("ID: Unknown"));
        assert!(prompt.contains("Symptoms: fever, sore throat"));
        assert!(prompt.contains("original note"));
    }
}
