//! Parsing of JSON the language model writes as free text.

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Parse a model reply as `T`.
///
/// The reply is tried as-is first. Models sometimes wrap the object in a
/// markdown fence or add a sentence around it, so the fenced body and then the
/// outermost `{ ... }` span are tried next. The error from the first attempt is
/// returned when nothing parses.
pub fn parse_model_json<T: DeserializeOwned>(raw: &str) -> Result<T, serde_json::Error> {
    let trimmed = raw.trim();
    let first_error = match serde_json::from_str(trimmed) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    let candidates = [strip_code_fence(trimmed), outermost_object(trimmed)];
    for candidate in candidates.into_iter().flatten() {
        if let Ok(value) = serde_json::from_str(candidate) {
            return Ok(value);
        }
    }

    Err(first_error)
}

/// Parse a model reply and read it as the object `T`.
///
/// Only the JSON syntax is checked. A reply that parses but is not an object
/// yields `T::default()`; how individual fields of an object are read is up to
/// `T`'s own deserializer.
pub fn parse_model_object<T>(raw: &str) -> Result<T, serde_json::Error>
where
    T: DeserializeOwned + Default,
{
    Ok(match parse_model_json::<Value>(raw)? {
        value @ Value::Object(_) => serde_json::from_value(value).unwrap_or_default(),
        _ => T::default(),
    })
}

fn strip_code_fence(text: &str) -> Option<&str> {
    let body = text.strip_prefix("```")?.strip_suffix("```")?;
    // drop the info string ("json") on the opening fence line
    let body = match body.find('\n') {
        Some(newline) => &body[newline + 1..],
        None => body,
    };
    Some(body.trim())
}

fn outermost_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}
