//! Request-scoped value objects exchanged between the pipeline steps and the
//! HTTP layer. Everything here serializes in camelCase to match the JSON the
//! browser client and the language model speak.
//!
//! The language model is only asked for JSON, never held to a schema, so the
//! fields decode leniently: `null` becomes the default, arrays of text are
//! joined and any other value is kept in its JSON form.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Patient details pulled out of the consultation text. All optional; nothing
/// is checked for plausibility.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatientInfo {
    #[serde(deserialize_with = "lenient_optional_text")]
    pub name: Option<String>,
    #[serde(deserialize_with = "lenient_age")]
    pub age: Option<u32>,
    #[serde(deserialize_with = "lenient_optional_text")]
    pub id: Option<String>,
    #[serde(deserialize_with = "lenient_optional_text")]
    pub gender: Option<String>,
}

/// Structured output of the extraction step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MedicalExtraction {
    #[serde(deserialize_with = "lenient_list")]
    pub symptoms: Vec<String>,
    #[serde(deserialize_with = "lenient_patient")]
    pub patient: PatientInfo,
    #[serde(deserialize_with = "lenient_text")]
    pub consultation_reason: String,
}

/// Output of the diagnosis step. The model writes the first three fields;
/// `full_report` is assembled locally from them and the extraction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosisResult {
    pub diagnosis: String,
    pub treatment: String,
    pub recommendations: String,
    pub full_report: String,
}

/// Aggregated payload of the consultation endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsultationResult {
    pub transcription: String,
    pub extracted_info: MedicalExtraction,
    pub diagnosis: DiagnosisResult,
}

/// Flatten a JSON value into display text. Strings are kept verbatim, array
/// items go on separate lines and `null` is empty.
fn value_to_text(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        Value::Array(items) => items
            .into_iter()
            .map(value_to_text)
            .filter(|item| !item.is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

pub(crate) fn lenient_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(value_to_text(Value::deserialize(deserializer)?))
}

fn lenient_optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let text = value_to_text(Value::deserialize(deserializer)?);
    Ok((!text.is_empty()).then_some(text))
}

/// A single string becomes a one-item list; array items are flattened one by one.
fn lenient_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let items = match Value::deserialize(deserializer)? {
        Value::Array(items) => items,
        other => vec![other],
    };
    Ok(items
        .into_iter()
        .map(value_to_text)
        .filter(|item| !item.is_empty())
        .collect())
}

/// Anything but an object leaves every patient field unknown.
fn lenient_patient<'de, D>(deserializer: D) -> Result<PatientInfo, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        value @ Value::Object(_) => serde_json::from_value(value).unwrap_or_default(),
        _ => PatientInfo::default(),
    })
}

/// Accepts `35`, `35.0` or `"35"` for the age; anything else is treated as
/// unknown rather than failing the whole extraction.
fn lenient_age<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f.round() as u64))
            .and_then(|n| u32::try_from(n).ok()),
        Some(Value::String(s)) => s.trim().parse::<u32>().ok(),
        _ => None,
    })
}
