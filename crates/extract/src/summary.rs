use crate::parsed::{FallbackReason, Parsed};

pub const SUMMARY_FALLBACK: &str = "Unable to generate summary";

pub const CHAT_FALLBACK: &str = "No response generated";

/// Summary text passes through unchanged; empty output becomes the fixed
/// placeholder.
pub fn parse_summary(raw: &str) -> Parsed<String> {
    parse_text(raw, SUMMARY_FALLBACK)
}

pub fn parse_chat_reply(raw: &str) -> Parsed<String> {
    parse_text(raw, CHAT_FALLBACK)
}

fn parse_text(raw: &str, placeholder: &str) -> Parsed<String> {
    if raw.trim().is_empty() {
        Parsed::fallback(placeholder.to_string(), FallbackReason::EmptyResponse)
    } else {
        Parsed::Value(raw.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_summary_uses_placeholder() {
        let parsed = parse_summary("");
        assert_eq!(parsed.value(), "Unable to generate summary");
        assert_eq!(parsed.fallback_reason(), Some(FallbackReason::EmptyResponse));
    }

    #[test]
    fn test_summary_is_passed_through_verbatim() {
        let text = "  The paper studies graphs.\n\nIt finds things.  ";
        assert_eq!(parse_summary(text), Parsed::Value(text.to_string()));
    }

    #[test]
    fn test_whitespace_only_reply_is_empty() {
        assert_eq!(parse_chat_reply(" \n\t").into_value(), CHAT_FALLBACK);
    }
}
