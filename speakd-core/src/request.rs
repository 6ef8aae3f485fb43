//! Speak request validation: raw body in, normalized `SynthesisRequest` out.

use serde::Deserialize;
use thiserror::Error;

/// Body of a speak request as received from the caller.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawSpeakRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
}

impl RawSpeakRequest {
    pub fn new(text: impl Into<String>, language: Option<&str>) -> Self {
        Self {
            text: Some(text.into()),
            language: language.map(str::to_string),
        }
    }
}

/// A request that is safe to hand to the engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisRequest {
    /// Trimmed, never empty.
    pub text: String,
    pub language: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationFailure {
    #[error("Text is required for speech synthesis")]
    EmptyText,
}

/// Reject missing or blank text; fill in the default language.
/// Language codes are not checked here, the engine reports unsupported ones.
pub fn validate_request(
    raw: &RawSpeakRequest,
    default_language: &str,
) -> Result<SynthesisRequest, ValidationFailure> {
    let text = raw
        .text
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ValidationFailure::EmptyText)?;
    let language = raw
        .language
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .unwrap_or(default_language);
    Ok(SynthesisRequest {
        text: text.to_string(),
        language: language.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_text_fails() {
        let raw = RawSpeakRequest::default();
        assert_eq!(validate_request(&raw, "hi"), Err(ValidationFailure::EmptyText));
    }

    #[test]
    fn empty_and_whitespace_text_fail() {
        for text in ["", " ", "\t\n  "] {
            let raw = RawSpeakRequest::new(text, Some("hi"));
            assert_eq!(validate_request(&raw, "hi"), Err(ValidationFailure::EmptyText), "{:?}", text);
        }
    }

    #[test]
    fn text_is_trimmed_and_language_kept() {
        let raw = RawSpeakRequest::new("  Hello there \n", Some("en"));
        let req = validate_request(&raw, "hi").unwrap();
        assert_eq!(req.text, "Hello there");
        assert_eq!(req.language, "en");
    }

    #[test]
    fn language_defaults_when_absent_or_blank() {
        let req = validate_request(&RawSpeakRequest::new("Hello", None), "hi").unwrap();
        assert_eq!(req.language, "hi");
        let req = validate_request(&RawSpeakRequest::new("Hello", Some("  ")), "hi").unwrap();
        assert_eq!(req.language, "hi");
    }

    #[test]
    fn unknown_language_passes_through() {
        let req = validate_request(&RawSpeakRequest::new("Hello", Some("xx-YY")), "hi").unwrap();
        assert_eq!(req.language, "xx-YY");
    }

    #[test]
    fn deserialize_ignores_unknown_fields() {
        let raw: RawSpeakRequest =
            serde_json::from_str(r#"{"text":"Hi","voice":"x"}"#).unwrap();
        assert_eq!(raw.text.as_deref(), Some("Hi"));
        assert!(raw.language.is_none());
    }
}
