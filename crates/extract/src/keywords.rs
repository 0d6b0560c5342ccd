use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::parsed::{FallbackReason, Parsed};
use crate::prompt;
use crate::schema::KeywordEntry;

/// Keywords as a delimited list: `k1, k2, k3`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlatKeywordFormat {
    pub delimiter: char,
}

impl Default for FlatKeywordFormat {
    fn default() -> Self {
        Self { delimiter: ',' }
    }
}

/// Keywords as a JSON array of `{"keyword", "definition"}` objects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredKeywordFormat;

/// Which keyword shape the assistant is asked for. Chosen by configuration,
/// never guessed from the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum KeywordFormat {
    Flat(FlatKeywordFormat),
    Structured(StructuredKeywordFormat),
}

impl Default for KeywordFormat {
    fn default() -> Self {
        KeywordFormat::Structured(StructuredKeywordFormat)
    }
}

impl KeywordFormat {
    pub fn prompt(&self) -> String {
        match self {
            KeywordFormat::Flat(flat) => prompt::build_flat_keywords_prompt(flat.delimiter),
            KeywordFormat::Structured(_) => prompt::STRUCTURED_KEYWORDS_PROMPT.to_string(),
        }
    }

    pub fn parse(&self, raw: &str) -> Parsed<Vec<KeywordEntry>> {
        match self {
            KeywordFormat::Flat(flat) => flat.parse(raw),
            KeywordFormat::Structured(structured) => structured.parse(raw),
        }
    }
}

impl FlatKeywordFormat {
    pub fn parse(&self, raw: &str) -> Parsed<Vec<KeywordEntry>> {
        let keywords: Vec<KeywordEntry> = raw
            .split(self.delimiter)
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(KeywordEntry::bare)
            .collect();

        if keywords.is_empty() {
            return Parsed::fallback(keywords, FallbackReason::EmptyResponse);
        }
        Parsed::Value(keywords)
    }
}

impl StructuredKeywordFormat {
    pub fn parse(&self, raw: &str) -> Parsed<Vec<KeywordEntry>> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Parsed::fallback(Vec::new(), FallbackReason::EmptyResponse);
        }

        let items = match serde_json::from_str::<Value>(trimmed) {
            Ok(Value::Array(items)) => items,
            Ok(_) => {
                warn!("Keyword response is not a JSON array");
                return Parsed::fallback(Vec::new(), FallbackReason::MalformedJson);
            }
            Err(e) => {
                warn!(error = %e, raw = %trimmed, "Failed to parse keyword response");
                return Parsed::fallback(Vec::new(), FallbackReason::MalformedJson);
            }
        };

        let keywords = items.iter().filter_map(keyword_entry).collect();
        Parsed::Value(keywords)
    }
}

fn keyword_entry(item: &Value) -> Option<KeywordEntry> {
    let keyword = field_text(item.get("keyword")?)?;
    let definition = field_text(item.get("definition")?)?;
    Some(KeywordEntry::defined(keyword, definition))
}

/// Text of a present field. Numbers and `true` are kept as their JSON text;
/// empty strings, zero, `false`, null and nested values are dropped.
fn field_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) if n.as_f64() != Some(0.0) => Some(n.to_string()),
        Value::Bool(true) => Some("true".to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_list_trims_and_drops_empty_segments() {
        let parsed = FlatKeywordFormat::default().parse("alpha, beta ,  , gamma");
        let keywords: Vec<_> = parsed.value().iter().map(|k| k.keyword.as_str()).collect();

        assert_eq!(keywords, vec!["alpha", "beta", "gamma"]);
        assert!(parsed.value().iter().all(|k| k.definition.is_none()));
        assert!(!parsed.is_fallback());
    }

    #[test]
    fn test_flat_list_with_custom_delimiter() {
        let format = FlatKeywordFormat { delimiter: ';' };
        let parsed = format.parse("graph theory; a, b ;");
        assert_eq!(
            parsed.into_value(),
            vec![KeywordEntry::bare("graph theory"), KeywordEntry::bare("a, b")]
        );
    }

    #[test]
    fn test_structured_drops_entries_missing_a_field() {
        let raw = r#"[{"keyword":"x","definition":"d"},{"keyword":"y"}]"#;
        let parsed = StructuredKeywordFormat.parse(raw);
        assert_eq!(parsed, Parsed::Value(vec![KeywordEntry::defined("x", "d")]));
    }

    #[test]
    fn test_structured_drops_empty_and_falsy_fields() {
        let raw = r#"
            [
              {"keyword": "", "definition": "orphan"},
              {"keyword": "zero", "definition": 0},
              {"keyword": "off", "definition": false},
              {"keyword": "nothing", "definition": null},
              {"keyword": "nested", "definition": {"text": "d"}},
              {"keyword": "neural networks", "definition": "Computing systems"},
              "stray"
            ]
        "#;
        let parsed = StructuredKeywordFormat.parse(raw);
        assert_eq!(
            parsed.into_value(),
            vec![KeywordEntry::defined("neural networks", "Computing systems")]
        );
    }

    #[test]
    fn test_structured_keeps_scalar_definitions_as_text() {
        let raw = r#"
            [
              {"keyword": "answer", "definition": 42},
              {"keyword": "pi", "definition": 3.14},
              {"keyword": "enabled", "definition": true},
              {"keyword": 1984, "definition": "A novel"}
            ]
        "#;
        let parsed = StructuredKeywordFormat.parse(raw);
        assert_eq!(
            parsed.into_value(),
            vec![
                KeywordEntry::defined("answer", "42"),
                KeywordEntry::defined("pi", "3.14"),
                KeywordEntry::defined("enabled", "true"),
                KeywordEntry::defined("1984", "A novel"),
            ]
        );
    }

    #[test]
    fn test_structured_malformed_json_yields_empty_list() {
        let parsed = StructuredKeywordFormat.parse("Here are your keywords: [{\"keyword\":");
        assert!(parsed.value().is_empty());
        assert_eq!(parsed.fallback_reason(), Some(FallbackReason::MalformedJson));

        let parsed = StructuredKeywordFormat.parse(r#"{"keyword":"x","definition":"d"}"#);
        assert_eq!(parsed.fallback_reason(), Some(FallbackReason::MalformedJson));
    }

    #[test]
    fn test_format_is_selected_not_detected() {
        let raw = r#"[{"keyword":"x","definition":"d"}]"#;
        let flat = KeywordFormat::Flat(FlatKeywordFormat::default()).parse(raw);
        // The flat parser splits on commas even when the text happens to be JSON.
        assert_eq!(flat.value().len(), 2);
    }

    #[test]
    fn test_keyword_format_config_shape() {
        let format: KeywordFormat =
            serde_json::from_str(r#"{"format":"flat","delimiter":";"}"#).unwrap();
        assert_eq!(format, KeywordFormat::Flat(FlatKeywordFormat { delimiter: ';' }));

        let format: KeywordFormat = serde_json::from_str(r#"{"format":"structured"}"#).unwrap();
        assert_eq!(format, KeywordFormat::default());
    }
}
