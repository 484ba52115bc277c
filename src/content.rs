//! Content handle — the input a rule evaluates against.

use std::borrow::Cow;

use serde_json::Value;

/// Borrowed by the engine for the duration of one extraction call and
/// never mutated. Markup is held as source text; the markup backend parses
/// it per evaluation (the parsed tree borrows internally and is not
/// `Send`).
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Markup(String),
    Json(Value),
    Text(String),
}

impl Content {
    pub fn from_html(s: impl Into<String>) -> Self {
        Content::Markup(s.into())
    }

    pub fn from_json(v: Value) -> Self {
        Content::Json(v)
    }

    pub fn from_text(s: impl Into<String>) -> Self {
        Content::Text(s.into())
    }

    /// Sniff a raw document: JSON if it parses as JSON and looks like a
    /// JSON container or scalar, markup otherwise. Used by the CLI; library
    /// callers construct the variant they mean.
    pub fn detect(s: &str) -> Self {
        let trimmed = s.trim_start();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            if let Ok(v) = serde_json::from_str::<Value>(s) {
                return Content::Json(v);
            }
        }
        Content::Markup(s.to_string())
    }

    /// The content's text form: markup source verbatim, JSON strings raw,
    /// other JSON values in their compact JSON spelling.
    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Content::Markup(s) | Content::Text(s) => Cow::Borrowed(s),
            Content::Json(Value::String(s)) => Cow::Borrowed(s),
            Content::Json(v) => Cow::Owned(v.to_string()),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Content::Markup(s) | Content::Text(s) => s.is_empty(),
            Content::Json(v) => v.is_null(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_detect_json_vs_markup() {
        assert!(matches!(Content::detect(r#"{"a":1}"#), Content::Json(_)));
        assert!(matches!(Content::detect("  [1,2]"), Content::Json(_)));
        assert!(matches!(Content::detect("<html></html>"), Content::Markup(_)));
        assert!(matches!(Content::detect("{not json"), Content::Markup(_)));
    }

    #[test]
    fn test_as_text() {
        assert_eq!(Content::from_text("x").as_text(), "x");
        assert_eq!(Content::from_json(json!("raw")).as_text(), "raw");
        assert_eq!(Content::from_json(json!({"a":1})).as_text(), r#"{"a":1}"#);
    }
}
